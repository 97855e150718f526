//! Subscription events, callbacks and lifecycle handle

pub mod event;
pub mod handle;
pub mod in_flight;
pub mod registry;

use std::sync::atomic::{AtomicU64, Ordering};

pub use event::{EventKey, EventType, SubscriptionEvent};
pub use handle::Subscription;
pub use in_flight::{current_callback_scope, CallbackFailure, InFlightSet, FAILURE_CAPACITY};
pub use registry::{CallbackHandle, CallbackRegistry};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate an operation identifier
///
/// Process-wide, so it is unique within any connection.
pub(crate) fn next_operation_id() -> String {
    NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed).to_string()
}
