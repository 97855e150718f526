//! Tracked callback work
//!
//! Every suspending callback runs as its own tokio task registered in the
//! owning subscription's [`InFlightSet`]. The entry is removed by a drop
//! guard once the task ends, including by panic, so
//! [`InFlightSet::wait_idle`] has a hard completion guarantee.

use super::event::EventType;
use crate::traits::CallbackResult;
use crossbeam_channel::{Sender, TrySendError};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Failures buffered per subscription before new ones are dropped
pub const FAILURE_CAPACITY: usize = 256;

tokio::task_local! {
    /// Subscription whose callback is currently executing on this task
    static CALLBACK_SCOPE: String;
}

/// Subscription id of the callback running on the current task, if any
pub fn current_callback_scope() -> Option<String> {
    CALLBACK_SCOPE.try_with(|scope| scope.clone()).ok()
}

/// A callback that failed or panicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    pub subscription_id: String,
    pub event_type: EventType,
    pub error: String,
}

pub struct InFlightSet {
    scope: String,
    next_unit: AtomicU64,
    units: Mutex<HashSet<u64>>,
    idle: Notify,
    failures: Sender<CallbackFailure>,
}

impl InFlightSet {
    pub fn new(scope: impl Into<String>, failures: Sender<CallbackFailure>) -> Arc<Self> {
        Arc::new(Self {
            scope: scope.into(),
            next_unit: AtomicU64::new(1),
            units: Mutex::new(HashSet::new()),
            idle: Notify::new(),
            failures,
        })
    }

    pub fn len(&self) -> usize {
        self.units.lock().len()
    }

    pub fn is_idle(&self) -> bool {
        self.units.lock().is_empty()
    }

    /// Log a callback failure and forward it to the diagnostic channel
    pub(crate) fn report(&self, event_type: EventType, error: String) {
        warn!(
            "Callback for '{}' on subscription {} failed: {}",
            event_type, self.scope, error
        );
        let failure = CallbackFailure {
            subscription_id: self.scope.clone(),
            event_type,
            error,
        };
        if let Err(TrySendError::Full(_)) = self.failures.try_send(failure) {
            debug!("Failure channel of subscription {} full, dropping", self.scope);
        }
    }

    /// Run a synchronous callback body inside this subscription's scope
    pub(crate) fn run_inline<F>(&self, event_type: EventType, f: F)
    where
        F: FnOnce() -> CallbackResult,
    {
        let outcome = CALLBACK_SCOPE.sync_scope(self.scope.clone(), || {
            std::panic::catch_unwind(AssertUnwindSafe(f))
        });
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(event_type, e.to_string()),
            Err(panic) => self.report(event_type, panic_message(panic)),
        }
    }

    /// Schedule a suspended callback as a tracked unit
    pub(crate) fn spawn(self: &Arc<Self>, event_type: EventType, work: BoxFuture<'static, CallbackResult>) {
        let unit = self.next_unit.fetch_add(1, Ordering::Relaxed);
        let set = Arc::clone(self);

        // Held across spawn so the unit cannot finish before it is recorded
        let mut units = self.units.lock();
        tokio::spawn(CALLBACK_SCOPE.scope(self.scope.clone(), async move {
            let _guard = UnitGuard { set: Arc::clone(&set), unit };
            match AssertUnwindSafe(work).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => set.report(event_type, e.to_string()),
                Err(panic) => set.report(event_type, panic_message(panic)),
            }
        }));
        units.insert(unit);
    }

    /// Wait until no tracked unit is running
    ///
    /// Must not be awaited from inside one of this set's own units.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn finish(&self, unit: u64) {
        let mut units = self.units.lock();
        units.remove(&unit);
        if units.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

struct UnitGuard {
    set: Arc<InFlightSet>,
    unit: u64,
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        self.set.finish(self.unit);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
