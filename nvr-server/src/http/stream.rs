//! Server-sent events stream of bus events

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use nvr_core::events::{ClientFilter, StreamMessage};
use serde::Deserialize;

use crate::AppState;

/// Query parameters for stream filtering, both comma-separated
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Event patterns, e.g. `motion,camera.*`
    #[serde(default)]
    pub types: Option<String>,
    /// Camera ids, or `*`
    #[serde(default)]
    pub cameras: Option<String>,
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

impl StreamQuery {
    pub fn filter(&self) -> ClientFilter {
        ClientFilter {
            event_types: split_list(self.types.as_deref()),
            cameras: split_list(self.cameras.as_deref()),
        }
    }
}

pub async fn event_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let client = state.manager.fanout().connect(query.filter());
    tracing::debug!(client = client.id(), "SSE client connected");

    let stream = futures::stream::unfold(client, |mut client| async move {
        loop {
            let event = client.recv().await?;
            match StreamMessage::event(&event).to_json() {
                Ok(json) => {
                    let sse = SseEvent::default()
                        .event(event.event_type.as_str())
                        .id(event.id.to_string())
                        .data(json);
                    return Some((Ok(sse), client));
                }
                Err(e) => {
                    tracing::warn!(error = %e, event_type = %event.event_type, "Failed to encode event");
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_lists_are_split_and_trimmed() {
        let query = StreamQuery {
            types: Some("motion, camera.* ,".into()),
            cameras: None,
        };
        let filter = query.filter();
        assert_eq!(filter.event_types, vec!["motion", "camera.*"]);
        assert!(filter.cameras.is_empty());
    }
}
