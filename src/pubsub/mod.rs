//! # Publish/Subscribe
//!
//! The change-notification side of the engine: an explicit [`EventBus`]
//! instance plus the channel-name and payload contract for
//! new-record events.

pub mod bus;
pub mod event;

pub use bus::{EventBus, EventReceiver, SubscriptionHandle};
pub use event::{LocationInserted, PacketInserted, LOCATION_INSERTED, PACKET_INSERTED};
