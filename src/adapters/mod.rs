//! Infrastructure Adapters
//!
//! Implementations of the non-backend domain ports. Cache backends live in
//! [`crate::backends`], repositories in [`crate::store`].

mod event_publisher;

pub use event_publisher::{
    BroadcastEventPublisher, CompositeEventPublisher, InMemoryEventCollector,
    LoggingEventPublisher,
};
