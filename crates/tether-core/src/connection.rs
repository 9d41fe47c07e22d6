//! Connection lifecycle
//!
//! Owns one transport-level connection's status machine and user-data
//! bag. The status moves `disconnected -> connecting -> connected ->
//! disconnected`; `connecting -> disconnected` is reachable directly when
//! the transport never opens.
//!
//! Open and close signals settle through the same three stages as channel
//! triggers (reduce, callback, update hook). A transport error goes to
//! the error callback with the current snapshot and changes no status on
//! its own - whether the connection is actually gone is the close
//! signal's call.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::channel::{Channel, ChannelOptions};
use crate::store::Store;
use crate::transport::{Transport, TransportError};

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected, not trying
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Connected and ready
    Connected,
}

/// Lifecycle callback (connect, disconnect): may transform the snapshot,
/// or return `None` to stop propagation to external holders.
pub type ConnectionCallback<A> = Rc<dyn Fn(Connection<A>) -> Option<Connection<A>>>;
/// Error callback: receives the transport error and the current snapshot.
pub type ConnectionErrorCallback<A> =
    Rc<dyn Fn(&TransportError, Connection<A>) -> Option<Connection<A>>>;
/// Update hook: the sole gate through which a snapshot becomes externally
/// visible. Defaults to identity.
pub type ConnectionUpdateHook<A> = Rc<dyn Fn(Connection<A>) -> Connection<A>>;

/// Lifecycle callbacks for a connection
pub struct ConnectionCallbacks<A> {
    pub(crate) connect: Option<ConnectionCallback<A>>,
    pub(crate) disconnect: Option<ConnectionCallback<A>>,
    pub(crate) error: Option<ConnectionErrorCallback<A>>,
    pub(crate) update: Option<ConnectionUpdateHook<A>>,
}

impl<A> ConnectionCallbacks<A> {
    pub fn new() -> Self {
        Self {
            connect: None,
            disconnect: None,
            error: None,
            update: None,
        }
    }

    /// Called after the transport opens; the snapshot already has status
    /// `Connected`.
    pub fn with_connect(
        mut self,
        f: impl Fn(Connection<A>) -> Option<Connection<A>> + 'static,
    ) -> Self {
        self.connect = Some(Rc::new(f));
        self
    }

    /// Called after the transport closes; the snapshot already has status
    /// `Disconnected`.
    pub fn with_disconnect(
        mut self,
        f: impl Fn(Connection<A>) -> Option<Connection<A>> + 'static,
    ) -> Self {
        self.disconnect = Some(Rc::new(f));
        self
    }

    /// Called on transport faults. Status is unchanged.
    pub fn with_error(
        mut self,
        f: impl Fn(&TransportError, Connection<A>) -> Option<Connection<A>> + 'static,
    ) -> Self {
        self.error = Some(Rc::new(f));
        self
    }

    /// Override the update hook (default: identity).
    pub fn with_update(mut self, f: impl Fn(Connection<A>) -> Connection<A> + 'static) -> Self {
        self.update = Some(Rc::new(f));
        self
    }
}

impl<A> Default for ConnectionCallbacks<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for ConnectionCallbacks<A> {
    fn clone(&self) -> Self {
        Self {
            connect: self.connect.clone(),
            disconnect: self.disconnect.clone(),
            error: self.error.clone(),
            update: self.update.clone(),
        }
    }
}

/// Options for creating a connection
pub struct ConnectionOptions<A> {
    /// Initial assigns
    pub assigns: A,
    /// Lifecycle callbacks
    pub callbacks: ConnectionCallbacks<A>,
}

impl<A: Default> Default for ConnectionOptions<A> {
    fn default() -> Self {
        Self {
            assigns: A::default(),
            callbacks: ConnectionCallbacks::new(),
        }
    }
}

/// Immutable snapshot of one transport-level connection
#[derive(Clone)]
pub struct Connection<A> {
    endpoint: String,
    status: ConnectionStatus,
    assigns: A,
    callbacks: ConnectionCallbacks<A>,
    transport: Rc<dyn Transport>,
}

impl<A> Connection<A> {
    /// Create a connection over the given transport.
    ///
    /// The snapshot starts in `Connecting`; the transport is not engaged
    /// until [`Store::connect`].
    pub fn new(
        endpoint: impl Into<String>,
        transport: Rc<dyn Transport>,
        options: ConnectionOptions<A>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            status: ConnectionStatus::Connecting,
            assigns: options.assigns,
            callbacks: options.callbacks,
            transport,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn assigns(&self) -> &A {
        &self.assigns
    }

    /// App-level view: status is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Both views agree: status is `Connected` *and* the transport itself
    /// reports a live connection. Defends against a stale app-level flag
    /// racing the transport's own state.
    pub fn is_ready(&self) -> bool {
        self.is_connected() && self.transport.is_connected()
    }

    /// New snapshot with assigns replaced by `f(assigns)`.
    pub fn assign(mut self, f: impl FnOnce(A) -> A) -> Self {
        self.assigns = f(self.assigns);
        self
    }

    /// Bind a topic to this connection. The channel starts unjoined and
    /// registers nothing until it joins.
    pub fn attach<S>(&self, topic: impl Into<String>, options: ChannelOptions<S>) -> Channel<S> {
        Channel::attached(topic, self.transport.clone(), options)
    }

    fn with_status(mut self, status: ConnectionStatus) -> Self {
        self.status = status;
        self
    }
}

impl<A> fmt::Debug for Connection<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl<A: Clone + 'static> Store<Connection<A>> {
    /// Engage the transport: register the open/close/error signals, then
    /// open the connection.
    pub fn connect(&self) -> Result<(), TransportError> {
        let connection = self.snapshot();
        let transport = connection.transport.clone();

        let store = self.clone();
        transport.on_open(Box::new(move || {
            let current = store.snapshot();
            debug!("transport open, endpoint {}", current.endpoint);
            let reduced = current.with_status(ConnectionStatus::Connected);
            let callback = reduced.callbacks.connect.clone();
            settle_lifecycle(&store, reduced, callback);
        }));

        let store = self.clone();
        transport.on_close(Box::new(move || {
            let current = store.snapshot();
            debug!("transport closed, endpoint {}", current.endpoint);
            let reduced = current.with_status(ConnectionStatus::Disconnected);
            let callback = reduced.callbacks.disconnect.clone();
            settle_lifecycle(&store, reduced, callback);
        }));

        let store = self.clone();
        transport.on_error(Box::new(move |err| {
            let current = store.snapshot();
            warn!("transport error, endpoint {}: {}", current.endpoint, err);
            let staged = match current.callbacks.error.clone() {
                Some(callback) => callback(err, current.clone()),
                None => Some(current.clone()),
            };
            // Status stays as it was; only the close signal decides that.
            settle(&store, current, staged);
        }));

        transport.connect()
    }

    /// Release the transport and set status to `Disconnected` right away,
    /// unlike the close-driven transition.
    ///
    /// No callbacks fire here; the transport's own close signal, which it
    /// must deliver at least once, drives the normal sequence when it
    /// arrives.
    pub fn disconnect(&self) -> Result<(), TransportError> {
        let connection = self.snapshot();
        let released = connection.transport.disconnect();
        self.update(|c| c.with_status(ConnectionStatus::Disconnected));
        released
    }
}

/// Stages 2 and 3 for open/close signals.
fn settle_lifecycle<A: Clone>(
    store: &Store<Connection<A>>,
    reduced: Connection<A>,
    callback: Option<ConnectionCallback<A>>,
) {
    let staged = match callback {
        Some(callback) => callback(reduced.clone()),
        None => Some(reduced.clone()),
    };
    settle(store, reduced, staged);
}

/// Stage 3. `None` from stage 2 keeps the step-1 snapshot internally and
/// skips the update hook.
fn settle<A: Clone>(
    store: &Store<Connection<A>>,
    reduced: Connection<A>,
    staged: Option<Connection<A>>,
) {
    match staged {
        None => store.publish(reduced),
        Some(next) => {
            let current = match next.callbacks.update.clone() {
                Some(hook) => hook(next),
                None => next,
            };
            store.publish(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::transport::mock::MockTransport;
    use serde_json::json;

    type Log = Rc<RefCell<Vec<String>>>;

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn connection(
        transport: &Rc<MockTransport>,
        callbacks: ConnectionCallbacks<u32>,
    ) -> Store<Connection<u32>> {
        Store::new(Connection::new(
            "wss://example.test/socket",
            transport.clone(),
            ConnectionOptions {
                assigns: 0,
                callbacks,
            },
        ))
    }

    #[test]
    fn test_new_connection_is_connecting_and_inert() {
        let transport = MockTransport::new();
        let store = connection(&transport, ConnectionCallbacks::new());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.status(), ConnectionStatus::Connecting);
        assert_eq!(snapshot.endpoint(), "wss://example.test/socket");
        assert!(!snapshot.is_connected());
        assert_eq!(transport.connect_calls.get(), 0);
    }

    #[test]
    fn test_connect_engages_transport_and_open_sets_connected() {
        let transport = MockTransport::new();
        let store = connection(&transport, ConnectionCallbacks::new());

        store.connect().unwrap();
        assert_eq!(transport.connect_calls.get(), 1);
        assert_eq!(store.snapshot().status(), ConnectionStatus::Connecting);

        transport.fire_open();
        assert_eq!(store.snapshot().status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_lifecycle_order_without_duplicates() {
        let transport = MockTransport::new();
        let seen = log();

        let connect_sink = seen.clone();
        let disconnect_sink = seen.clone();
        let update_sink = seen.clone();
        let callbacks = ConnectionCallbacks::new()
            .with_connect(move |connection| {
                connect_sink.borrow_mut().push("connect".to_string());
                Some(connection)
            })
            .with_disconnect(move |connection| {
                disconnect_sink.borrow_mut().push("disconnect".to_string());
                Some(connection)
            })
            .with_update(move |connection| {
                update_sink
                    .borrow_mut()
                    .push(format!("update {:?}", connection.status()));
                connection
            });
        let store = connection(&transport, callbacks);

        store.connect().unwrap();
        transport.fire_open();
        transport.fire_close();

        assert_eq!(store.snapshot().status(), ConnectionStatus::Disconnected);
        assert_eq!(
            seen.borrow().as_slice(),
            &[
                "connect".to_string(),
                "update Connected".to_string(),
                "disconnect".to_string(),
                "update Disconnected".to_string(),
            ]
        );
    }

    #[test]
    fn test_connecting_to_disconnected_is_reachable_directly() {
        let transport = MockTransport::new();
        let store = connection(&transport, ConnectionCallbacks::new());

        store.connect().unwrap();
        // Open never fires; the transport gives up and closes.
        transport.fire_close();

        assert_eq!(store.snapshot().status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_transport_error_leaves_status_untouched() {
        let transport = MockTransport::new();
        let seen = log();

        let sink = seen.clone();
        let callbacks = ConnectionCallbacks::new().with_error(move |err, connection| {
            sink.borrow_mut()
                .push(format!("{} while {:?}", err, connection.status()));
            Some(connection)
        });
        let store = connection(&transport, callbacks);

        store.connect().unwrap();
        transport.fire_open();
        transport.fire_error(TransportError::Failure("tls handshake".to_string()));

        assert_eq!(store.snapshot().status(), ConnectionStatus::Connected);
        assert_eq!(
            seen.borrow().as_slice(),
            &["transport failure: tls handshake while Connected".to_string()]
        );
    }

    #[test]
    fn test_disconnect_is_synchronous() {
        let transport = MockTransport::new();
        let store = connection(&transport, ConnectionCallbacks::new());

        store.connect().unwrap();
        transport.fire_open();
        store.disconnect().unwrap();

        // No close signal yet, the status already moved.
        assert_eq!(transport.disconnect_calls.get(), 1);
        assert_eq!(store.snapshot().status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_is_ready_requires_transport_agreement() {
        let transport = MockTransport::new();
        let store = connection(&transport, ConnectionCallbacks::new());

        store.connect().unwrap();
        transport.fire_open();

        let snapshot = store.snapshot();
        assert!(snapshot.is_connected());
        assert!(snapshot.is_ready());

        // The transport drops underneath a stale app-level flag.
        transport.connected.set(false);
        assert!(snapshot.is_connected());
        assert!(!snapshot.is_ready());
    }

    #[test]
    fn test_assign_is_pure() {
        let transport = MockTransport::new();
        let store = connection(&transport, ConnectionCallbacks::new());

        let before = store.snapshot();
        let after = before.clone().assign(|n| n + 5);

        assert_eq!(*before.assigns(), 0);
        assert_eq!(*after.assigns(), 5);
        // The store saw nothing; publishing is explicit.
        assert_eq!(*store.snapshot().assigns(), 0);

        store.publish(after);
        assert_eq!(*store.snapshot().assigns(), 5);
    }

    #[test]
    fn test_connect_callback_transforms_snapshot() {
        let transport = MockTransport::new();
        let callbacks =
            ConnectionCallbacks::new().with_connect(|connection| Some(connection.assign(|_| 7)));
        let store = connection(&transport, callbacks);

        store.connect().unwrap();
        transport.fire_open();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.status(), ConnectionStatus::Connected);
        assert_eq!(*snapshot.assigns(), 7);
    }

    #[test]
    fn test_callback_none_keeps_internal_snapshot_but_skips_hook() {
        let transport = MockTransport::new();
        let hooks = Rc::new(RefCell::new(0));

        let counter = hooks.clone();
        let callbacks = ConnectionCallbacks::new()
            .with_connect(|_| None)
            .with_update(move |connection| {
                *counter.borrow_mut() += 1;
                connection
            });
        let store = connection(&transport, callbacks);

        store.connect().unwrap();
        transport.fire_open();

        assert_eq!(*hooks.borrow(), 0);
        // The transition stuck internally all the same.
        assert_eq!(store.snapshot().status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_attach_binds_topic_without_touching_transport() {
        let transport = MockTransport::new();
        let store = connection(&transport, ConnectionCallbacks::new());

        let channel = store.snapshot().attach(
            "room:lobby",
            ChannelOptions {
                params: json!({}),
                assigns: String::new(),
                callbacks: Default::default(),
            },
        );

        assert_eq!(channel.topic(), "room:lobby");
        assert!(!channel.joined());
        assert!(transport.join_requests.borrow().is_empty());
        assert_eq!(transport.message_handler_count("room:lobby"), 0);
    }
}
