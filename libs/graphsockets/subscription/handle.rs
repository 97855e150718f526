//! Public lifecycle object for one subscription

use super::event::{EventKey, SubscriptionEvent};
use super::in_flight::{current_callback_scope, CallbackFailure, InFlightSet, FAILURE_CAPACITY};
use super::registry::{CallbackHandle, CallbackRegistry};
use crate::core::connection::ConnectionCommand;
use crate::graphql::request::GraphQLRequest;
use crate::protocol::state::{ProtocolError, StateInput, StateMachine, SubscriptionState, Transition};
use crate::traits::EventCallback;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// State shared between a [`Subscription`] and its connection's reader
pub(crate) struct SubscriptionShared {
    pub(crate) id: String,
    pub(crate) request: GraphQLRequest,
    pub(crate) registry: Arc<CallbackRegistry>,
    pub(crate) in_flight: Arc<InFlightSet>,
    pub(crate) auto_close: bool,
    machine: Mutex<StateMachine>,
    state_tx: watch::Sender<SubscriptionState>,
    stop_requested: AtomicBool,
    /// Command channel of the connection this subscription is attached to
    commands: Mutex<Option<mpsc::UnboundedSender<ConnectionCommand>>>,
    failures: Receiver<CallbackFailure>,
}

impl SubscriptionShared {
    pub(crate) fn new(
        id: String,
        request: GraphQLRequest,
        registry: Arc<CallbackRegistry>,
        auto_close: bool,
    ) -> Arc<Self> {
        let (failure_tx, failures) = crossbeam_channel::bounded(FAILURE_CAPACITY);
        let (state_tx, _) = watch::channel(SubscriptionState::Init);
        Arc::new(Self {
            in_flight: InFlightSet::new(id.clone(), failure_tx),
            machine: Mutex::new(StateMachine::new(id.clone())),
            id,
            request,
            registry,
            auto_close,
            state_tx,
            stop_requested: AtomicBool::new(false),
            commands: Mutex::new(None),
            failures,
        })
    }

    pub(crate) fn state(&self) -> SubscriptionState {
        *self.state_tx.borrow()
    }

    /// Point stop requests at a connection's reader
    pub(crate) fn attach(&self, commands: mpsc::UnboundedSender<ConnectionCommand>) {
        *self.commands.lock() = Some(commands);
    }

    /// Drive the state machine and publish the new state
    pub(crate) fn apply(&self, input: StateInput) -> Result<Transition, ProtocolError> {
        let mut machine = self.machine.lock();
        let transition = machine.apply(input)?;
        if transition.changed() {
            debug!(
                "Subscription {}: {} -> {} on {:?}",
                self.id, transition.from, transition.to, input
            );
            self.state_tx.send_replace(transition.to);
        }
        Ok(transition)
    }

    pub(crate) fn dispatch(&self, event: &SubscriptionEvent) {
        self.registry.dispatch(event, &self.in_flight);
    }

    /// Mark stop as requested; true only for the first caller
    pub(crate) fn request_stop(&self) -> bool {
        !self.stop_requested.swap(true, Ordering::AcqRel)
    }
}

/// Handle to a live subscription
///
/// Cheap to clone; every clone controls the same subscription.
#[derive(Clone)]
pub struct Subscription {
    shared: Arc<SubscriptionShared>,
}

impl Subscription {
    pub(crate) fn new(shared: Arc<SubscriptionShared>) -> Self {
        Self { shared }
    }

    /// Operation identifier, unique within the connection
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn request(&self) -> &GraphQLRequest {
        &self.shared.request
    }

    pub fn state(&self) -> SubscriptionState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        !self.state().is_terminal()
    }

    pub fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }

    /// Register an additional callback on the live subscription
    pub fn on(&self, key: impl Into<EventKey>, callback: Arc<dyn EventCallback>) -> CallbackHandle {
        self.shared.registry.register(key, callback)
    }

    pub fn off(&self, handle: &CallbackHandle) -> bool {
        self.shared.registry.unregister(handle)
    }

    /// Diagnostic channel of callback failures
    ///
    /// Holds at most [`FAILURE_CAPACITY`] undrained failures; later ones are
    /// only logged.
    pub fn failures(&self) -> Receiver<CallbackFailure> {
        self.shared.failures.clone()
    }

    /// Number of suspended callbacks still running
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.len()
    }

    /// Ask the connection to stop this subscription
    ///
    /// Only the first call has an effect; later calls are no-ops.
    pub fn unsubscribe(&self) {
        if !self.shared.request_stop() {
            return;
        }

        let command = ConnectionCommand::Stop {
            id: self.shared.id.clone(),
        };
        let sent = match self.shared.commands.lock().as_ref() {
            Some(commands) => commands.send(command).is_ok(),
            None => {
                // Never started
                let _ = self.shared.apply(StateInput::Unsubscribe);
                return;
            }
        };
        if !sent {
            // Reader is gone; it already failed every live subscription
            let input = if self.state().is_terminal() {
                StateInput::Release
            } else {
                StateInput::ConnectionError
            };
            let _ = self.shared.apply(input);
        }
    }

    /// Unsubscribe, then wait for a terminal state and for in-flight callbacks
    ///
    /// Called from inside one of this subscription's own callbacks, the wait
    /// moves to a separate task and this returns right away.
    pub async fn unsubscribe_and_wait(&self) {
        self.unsubscribe();

        if current_callback_scope().as_deref() == Some(self.id()) {
            let this = self.clone();
            tokio::spawn(async move {
                this.wait_closed().await;
                debug!("Subscription {} torn down", this.id());
            });
            return;
        }

        self.wait_closed().await;
    }

    /// Wait until the subscription reaches a terminal state
    pub async fn wait(&self) -> SubscriptionState {
        let mut rx = self.shared.state_tx.subscribe();
        let result = rx.wait_for(|state| state.is_terminal()).await.map(|state| *state);
        result.unwrap_or_else(|_| self.state())
    }

    async fn wait_closed(&self) {
        self.wait().await;
        self.shared.in_flight.wait_idle().await;
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}
