//! Event distribution
//!
//! [`EventBus`] delivers events to plugin and system subscribers, each
//! through its own bounded queue. [`StreamFanout`] forwards the same stream
//! to live API clients.

mod bus;
mod fanout;

pub use bus::{BusStats, EventBus, SubscriberId, SubscriberInfo, SubscriberOwner};
pub use fanout::{ClientFilter, ClientId, ClientStats, FanoutClient, StreamFanout, StreamMessage};

pub use nvr_plugin_api::{Event, EventPattern, PublishReport};
