//! Fire-and-forget event publishing.

use netscope_core::events::{EventSink, ScanEvent};

/// Publish `event`, logging instead of propagating a sink failure.
pub(crate) fn publish<S>(sink: &S, event: ScanEvent)
where
    S: EventSink + ?Sized,
{
    let name = event.name();
    if let Err(e) = sink.publish(event) {
        tracing::warn!(event = name, error = %e, "Failed to publish scan event");
    }
}
