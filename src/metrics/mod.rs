//! Metrics infrastructure.
//!
//! Components record measurable occurrences as internal events; the `emit!`
//! macro forwards them to the metrics recorder installed by the binary. A
//! trigger run with no recorder installed emits into the void, which keeps
//! the library free of any observability wiring.

pub mod events;

/// Emit an internal event as a metric.
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
