//! Deadline and panic guard for calls into plugin code

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

/// How a guarded call ended
#[derive(Debug)]
pub(crate) enum Guarded<T> {
    Completed(T),
    TimedOut,
    Panicked(String),
    Cancelled,
}

/// Run `fut` under `deadline`, converting a panic into [`Guarded::Panicked`].
///
/// If `cancel` fires first the future is dropped and `Cancelled` returned.
pub(crate) async fn guarded<F>(
    fut: F,
    deadline: Duration,
    cancel: Option<&CancellationToken>,
) -> Guarded<F::Output>
where
    F: Future,
{
    let call = tokio::time::timeout(deadline, AssertUnwindSafe(fut).catch_unwind());
    let outcome = match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => return Guarded::Cancelled,
            outcome = call => outcome,
        },
        None => call.await,
    };
    match outcome {
        Ok(Ok(value)) => Guarded::Completed(value),
        Ok(Err(payload)) => Guarded::Panicked(panic_message(payload.as_ref())),
        Err(_) => Guarded::TimedOut,
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
