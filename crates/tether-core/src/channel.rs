//! Channel lifecycle and callback composition
//!
//! A channel owns one topic's join/leave lifecycle on top of a
//! connection. Joining registers the four inbound protocol triggers
//! (full-state, patch, event, error) plus the topic's close notification,
//! then requests the join from the transport.
//!
//! Every trigger settles in the same fixed order:
//!
//! 1. **reduce** - compute the new snapshot as a pure function of the
//!    current snapshot and the incoming message;
//! 2. **callback** - hand that snapshot to the matching user lifecycle
//!    callback, if registered; returning `None` means "no further change"
//!    and stops propagation to external holders;
//! 3. **update hook** - whatever step 2 produced goes through the update
//!    hook and becomes the new current snapshot.
//!
//! Visibility is gated entirely by the update hook: when a callback
//! returns `None`, the step-1 snapshot still becomes the internal current
//! value (so `joined` transitions always stick) but the hook is not
//! invoked for it, and external holders never see that turn.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ChannelError, DispatchError};
use crate::event::{self, EventHandlers};
use crate::message::{self, EventEnvelope, ServerMessage};
use crate::state::{self, PatchOutcome, StateData};
use crate::store::Store;
use crate::transport::{JoinReply, Transport};

/// Lifecycle callback (join, leave): may transform the snapshot, or
/// return `None` to stop propagation to external holders.
pub type ChannelCallback<A> = Rc<dyn Fn(Channel<A>) -> Option<Channel<A>>>;
/// Error callback: receives the error and the current snapshot.
pub type ChannelErrorCallback<A> = Rc<dyn Fn(&ChannelError, Channel<A>) -> Option<Channel<A>>>;
/// State-change callback: receives the freshly reconciled state and the
/// snapshot already carrying it.
pub type StateChangeCallback<A> = Rc<dyn Fn(&StateData, Channel<A>) -> Option<Channel<A>>>;
/// Update hook: the sole gate through which a snapshot becomes externally
/// visible. Defaults to identity.
pub type ChannelUpdateHook<A> = Rc<dyn Fn(Channel<A>) -> Channel<A>>;

/// Lifecycle callbacks and event handlers for a channel
pub struct ChannelCallbacks<A> {
    pub(crate) join: Option<ChannelCallback<A>>,
    pub(crate) leave: Option<ChannelCallback<A>>,
    pub(crate) error: Option<ChannelErrorCallback<A>>,
    pub(crate) state_change: Option<StateChangeCallback<A>>,
    pub(crate) update: Option<ChannelUpdateHook<A>>,
    pub(crate) event_handlers: EventHandlers<A>,
}

impl<A> ChannelCallbacks<A> {
    pub fn new() -> Self {
        Self {
            join: None,
            leave: None,
            error: None,
            state_change: None,
            update: None,
            event_handlers: EventHandlers::new(),
        }
    }

    /// Called after a join is acknowledged; the snapshot already has
    /// `joined == true`.
    pub fn with_join(mut self, f: impl Fn(Channel<A>) -> Option<Channel<A>> + 'static) -> Self {
        self.join = Some(Rc::new(f));
        self
    }

    /// Called after the topic's close notification; the snapshot already
    /// has `joined == false`.
    pub fn with_leave(mut self, f: impl Fn(Channel<A>) -> Option<Channel<A>> + 'static) -> Self {
        self.leave = Some(Rc::new(f));
        self
    }

    /// Called for join rejections, server error messages and transport
    /// failures on this channel.
    pub fn with_error(
        mut self,
        f: impl Fn(&ChannelError, Channel<A>) -> Option<Channel<A>> + 'static,
    ) -> Self {
        self.error = Some(Rc::new(f));
        self
    }

    /// Called whenever the tracked state is replaced or patched.
    pub fn with_state_change(
        mut self,
        f: impl Fn(&StateData, Channel<A>) -> Option<Channel<A>> + 'static,
    ) -> Self {
        self.state_change = Some(Rc::new(f));
        self
    }

    /// Override the update hook (default: identity).
    pub fn with_update(mut self, f: impl Fn(Channel<A>) -> Channel<A> + 'static) -> Self {
        self.update = Some(Rc::new(f));
        self
    }

    /// Register an event-type handler. Last registration for a type wins.
    pub fn with_handler(
        mut self,
        kind: impl Into<String>,
        handler: impl Fn(&Value, Channel<A>) -> Channel<A> + 'static,
    ) -> Self {
        self.event_handlers.insert(kind, handler);
        self
    }
}

impl<A> Default for ChannelCallbacks<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for ChannelCallbacks<A> {
    fn clone(&self) -> Self {
        Self {
            join: self.join.clone(),
            leave: self.leave.clone(),
            error: self.error.clone(),
            state_change: self.state_change.clone(),
            update: self.update.clone(),
            event_handlers: self.event_handlers.clone(),
        }
    }
}

/// Options for attaching a channel to a connection
pub struct ChannelOptions<A> {
    /// Parameters sent with the join request
    pub params: Value,
    /// Initial assigns
    pub assigns: A,
    /// Lifecycle callbacks and event handlers
    pub callbacks: ChannelCallbacks<A>,
}

impl<A: Default> Default for ChannelOptions<A> {
    fn default() -> Self {
        Self {
            params: Value::Null,
            assigns: A::default(),
            callbacks: ChannelCallbacks::new(),
        }
    }
}

/// Immutable snapshot of one topic's channel
///
/// Every transition produces a new value; holders stay current by
/// re-subscribing through the update hook.
#[derive(Clone)]
pub struct Channel<A> {
    topic: String,
    joined: bool,
    assigns: A,
    state: Option<StateData>,
    params: Value,
    callbacks: ChannelCallbacks<A>,
    transport: Rc<dyn Transport>,
}

impl<A> Channel<A> {
    /// Bind a topic to a connection's transport. Registers nothing and
    /// contacts nobody; that happens on join.
    pub(crate) fn attached(
        topic: impl Into<String>,
        transport: Rc<dyn Transport>,
        options: ChannelOptions<A>,
    ) -> Self {
        Self {
            topic: topic.into(),
            joined: false,
            assigns: options.assigns,
            state: None,
            params: options.params,
            callbacks: options.callbacks,
            transport,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn joined(&self) -> bool {
        self.joined
    }

    pub fn assigns(&self) -> &A {
        &self.assigns
    }

    /// The tracked server state, absent until the first full-state message.
    pub fn state(&self) -> Option<&StateData> {
        self.state.as_ref()
    }

    pub fn callbacks(&self) -> &ChannelCallbacks<A> {
        &self.callbacks
    }

    /// New snapshot with assigns replaced by `f(assigns)`.
    pub fn assign(mut self, f: impl FnOnce(A) -> A) -> Self {
        self.assigns = f(self.assigns);
        self
    }

    /// New snapshot carrying the given tracked state.
    pub fn with_state(mut self, state: StateData) -> Self {
        self.state = Some(state);
        self
    }

    fn with_joined(mut self, joined: bool) -> Self {
        self.joined = joined;
        self
    }
}

impl<A> fmt::Debug for Channel<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.topic)
            .field("joined", &self.joined)
            .field("version", &self.state.as_ref().map(|s| s.version))
            .finish_non_exhaustive()
    }
}

impl<A: Clone + 'static> Store<Channel<A>> {
    /// Join the channel's topic.
    ///
    /// No-op if already joined: a second call registers nothing and sends
    /// no duplicate join request. Otherwise registers the four inbound
    /// protocol triggers and the close notification, then requests the
    /// join. `joined` flips on the acknowledgment, not here, and flips
    /// before the join callback runs, so the callback observes
    /// `joined == true`.
    pub fn join(&self) -> Result<(), ChannelError> {
        let channel = self.snapshot();
        if channel.joined {
            debug!("join skipped, topic {} already joined", channel.topic);
            return Ok(());
        }

        let topic = channel.topic.clone();
        let transport = channel.transport.clone();

        for name in [
            message::MSG_CHANGE,
            message::MSG_PATCH,
            message::MSG_EVENT,
            message::MSG_ERROR,
        ] {
            let store = self.clone();
            transport.on_message(
                &topic,
                name,
                Box::new(move |payload| match ServerMessage::decode(name, payload) {
                    Ok(msg) => handle_message(&store, msg),
                    Err(err) => {
                        warn!("dropping inbound message: {}", err);
                    }
                }),
            );
        }

        let store = self.clone();
        transport.on_topic_close(
            &topic,
            Box::new(move || {
                let current = store.snapshot();
                debug!("channel closed, topic {}", current.topic);
                let reduced = current.with_joined(false);
                let callback = reduced.callbacks.leave.clone();
                settle_lifecycle(&store, reduced, callback);
            }),
        );

        let store = self.clone();
        let requested = transport.join(
            &topic,
            channel.params.clone(),
            Box::new(move |reply| match reply {
                JoinReply::Ok(_) => {
                    let current = store.snapshot();
                    debug!("join acknowledged, topic {}", current.topic);
                    let reduced = current.with_joined(true);
                    let callback = reduced.callbacks.join.clone();
                    settle_lifecycle(&store, reduced, callback);
                }
                JoinReply::Error(reason) => {
                    let current = store.snapshot();
                    let err = ChannelError::JoinRejected {
                        topic: current.topic.clone(),
                        reason,
                    };
                    warn!("{}", err);
                    settle_error(&store, current, &err);
                }
            }),
        );

        if let Err(source) = requested {
            let err = ChannelError::Transport { topic, source };
            warn!("{}", err);
            settle_error(self, self.snapshot(), &err);
            return Err(err);
        }

        Ok(())
    }

    /// Leave the channel's topic.
    ///
    /// No-op if not joined. The `joined == false` transition does not
    /// happen here: it arrives asynchronously with the topic's close
    /// notification.
    pub fn leave(&self) -> Result<(), ChannelError> {
        let channel = self.snapshot();
        if !channel.joined {
            debug!("leave skipped, topic {} not joined", channel.topic);
            return Ok(());
        }

        channel
            .transport
            .leave(&channel.topic)
            .map_err(|source| ChannelError::Transport {
                topic: channel.topic.clone(),
                source,
            })
    }

    /// Send an event envelope to the server. No local handler runs.
    pub fn push(&self, kind: &str, payload: Value) -> Result<(), ChannelError> {
        let channel = self.snapshot();
        let envelope = EventEnvelope::new(kind, payload);
        let body = serde_json::to_value(&envelope).expect("event envelope encodes to JSON");

        channel
            .transport
            .send(&channel.topic, message::MSG_EVENT, body)
            .map_err(|source| ChannelError::Transport {
                topic: channel.topic.clone(),
                source,
            })
    }

    /// Dispatch an event locally, without contacting the server.
    ///
    /// Same code path as a server-delivered event: the registered handler
    /// runs and its result goes through the update hook exactly once. An
    /// unregistered type is a hard error.
    pub fn dispatch(&self, kind: &str, payload: Value) -> Result<(), DispatchError> {
        let channel = self.snapshot();
        let envelope = EventEnvelope::new(kind, payload);
        let next = event::deliver(channel, &envelope)?;
        adopt(self, next);
        Ok(())
    }
}

/// Route a decoded protocol message through the reduce/callback/hook
/// stages.
fn handle_message<A: Clone + 'static>(store: &Store<Channel<A>>, msg: ServerMessage) {
    match msg {
        ServerMessage::Change(data) => {
            let current = store.snapshot();
            let next_state = state::apply_full_state(data.state, data.version);
            debug!(
                "full state replaced, topic {} version {}",
                current.topic, next_state.version
            );
            let reduced = current.with_state(next_state.clone());
            settle_state(store, reduced, &next_state);
        }
        ServerMessage::Patch(patch) => {
            let current = store.snapshot();
            let Some(tracked) = current.state.clone() else {
                debug!(
                    "patch before initial state dropped, topic {} version {}",
                    current.topic, patch.version
                );
                return;
            };
            match state::apply_patch(&tracked, &patch) {
                PatchOutcome::Applied(next_state) => {
                    debug!(
                        "patch applied, topic {} version {}",
                        current.topic, next_state.version
                    );
                    let reduced = current.with_state(next_state.clone());
                    settle_state(store, reduced, &next_state);
                }
                PatchOutcome::Rejected(reason) => {
                    debug!("patch dropped, topic {}: {:?}", current.topic, reason);
                }
            }
        }
        ServerMessage::Event(envelope) => {
            let current = store.snapshot();
            let next = match event::deliver(current, &envelope) {
                Ok(next) => next,
                // An unregistered event type is a registration-contract
                // defect, and there is no caller to hand the error to on
                // the server-delivery path.
                Err(err) => panic!("{}", err),
            };
            adopt(store, next);
        }
        ServerMessage::Error(detail) => {
            let current = store.snapshot();
            let err = ChannelError::Server {
                topic: current.topic.clone(),
                detail,
            };
            warn!("{}", err);
            settle_error(store, current, &err);
        }
    }
}

/// Stages 2 and 3 for join/leave triggers.
fn settle_lifecycle<A: Clone>(
    store: &Store<Channel<A>>,
    reduced: Channel<A>,
    callback: Option<ChannelCallback<A>>,
) {
    let staged = match callback {
        Some(callback) => callback(reduced.clone()),
        None => Some(reduced.clone()),
    };
    settle(store, reduced, staged);
}

/// Stages 2 and 3 for full-state and patch triggers.
fn settle_state<A: Clone>(store: &Store<Channel<A>>, reduced: Channel<A>, next_state: &StateData) {
    let staged = match reduced.callbacks.state_change.clone() {
        Some(callback) => callback(next_state, reduced.clone()),
        None => Some(reduced.clone()),
    };
    settle(store, reduced, staged);
}

/// Stages 2 and 3 for the error triggers. The error never changes the
/// snapshot by itself.
fn settle_error<A: Clone>(store: &Store<Channel<A>>, reduced: Channel<A>, err: &ChannelError) {
    let staged = match reduced.callbacks.error.clone() {
        Some(callback) => callback(err, reduced.clone()),
        None => Some(reduced.clone()),
    };
    settle(store, reduced, staged);
}

/// Stage 3. `None` from stage 2 keeps the step-1 snapshot internally and
/// skips the update hook.
fn settle<A: Clone>(store: &Store<Channel<A>>, reduced: Channel<A>, staged: Option<Channel<A>>) {
    match staged {
        None => store.publish(reduced),
        Some(next) => adopt(store, next),
    }
}

/// Run the update hook (identity by default) and publish its result as
/// the new current snapshot.
fn adopt<A: Clone>(store: &Store<Channel<A>>, next: Channel<A>) {
    let current = match next.callbacks.update.clone() {
        Some(hook) => hook(next),
        None => next,
    };
    store.publish(current);
}
