//! Callback interface for subscription events
//!
//! Plain functions and suspending (async) functions sit behind the single
//! [`EventCallback`] trait. Invoking a callback yields an [`Invocation`]:
//! synchronous callbacks have already finished, suspending ones hand back a
//! future that the registry schedules as an independently tracked unit of
//! work. The dispatch path never branches on the callback kind beyond that.

use crate::subscription::event::SubscriptionEvent;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// Error a callback may return; reported, never propagated
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result of running a callback
pub type CallbackResult = std::result::Result<(), CallbackError>;

/// Outcome of invoking a callback
pub enum Invocation {
    /// Ran to completion inline
    Complete(CallbackResult),
    /// Needs to be scheduled and tracked until it resolves
    Suspended(BoxFuture<'static, CallbackResult>),
}

/// A listener for subscription events
pub trait EventCallback: Send + Sync + 'static {
    fn invoke(&self, event: SubscriptionEvent) -> Invocation;
}

/// Adapter for synchronous closures
pub struct SyncCallback<F>(F);

impl<F> EventCallback for SyncCallback<F>
where
    F: Fn(&SubscriptionEvent) -> CallbackResult + Send + Sync + 'static,
{
    fn invoke(&self, event: SubscriptionEvent) -> Invocation {
        Invocation::Complete((self.0)(&event))
    }
}

/// Adapter for closures returning a future
pub struct AsyncCallback<F>(F);

impl<F, Fut> EventCallback for AsyncCallback<F>
where
    F: Fn(SubscriptionEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallbackResult> + Send + 'static,
{
    fn invoke(&self, event: SubscriptionEvent) -> Invocation {
        Invocation::Suspended(Box::pin((self.0)(event)))
    }
}

/// Wrap a synchronous closure as a callback
pub fn sync_callback<F>(f: F) -> Arc<dyn EventCallback>
where
    F: Fn(&SubscriptionEvent) -> CallbackResult + Send + Sync + 'static,
{
    Arc::new(SyncCallback(f))
}

/// Wrap an async closure as a callback
pub fn async_callback<F, Fut>(f: F) -> Arc<dyn EventCallback>
where
    F: Fn(SubscriptionEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CallbackResult> + Send + 'static,
{
    Arc::new(AsyncCallback(f))
}
