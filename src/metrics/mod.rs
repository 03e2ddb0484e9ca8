//! Metrics and observability.
//!
//! - `events`: internal event types and the `InternalEvent` trait
//! - `server`: Prometheus recorder and HTTP endpoint

pub mod events;
pub mod server;

pub use server::init;

/// Emit an internal event.
///
/// Calls `InternalEvent::emit()` on the event, which records the matching
/// metric. Without an installed recorder this is a no-op.
///
/// ```ignore
/// use catalog_roi::metrics::events::{ItemProcessed, ItemStatus};
///
/// emit!(ItemProcessed { status: ItemStatus::Succeeded });
/// ```
#[macro_export]
macro_rules! emit {
    ($event:expr) => {
        $crate::metrics::events::InternalEvent::emit($event)
    };
}
