//! Serialization of connection-mutating operations.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use derive_more::Display;
use futures::{future::LocalBoxFuture, FutureExt as _};
use medea_media_event_proto::{MediaKind, TrackId};
use tracerr::Traced;

use crate::{
    platform::{
        IceConnectionState, IceGatheringState, PeerConnectionEvent,
        PeerConnectionState, RtcPeerConnection, SignalingState,
    },
    state::{NegotiationPhase, StateManager},
    utils::{Deferred, EventListener},
};

/// Errors a queued [`Command`] may be rejected with.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum CommandError {
    /// Preconditions of the [`Command`] are not met.
    #[display(fmt = "Validation failed: {}", _0)]
    Validation(String),

    /// SDP exchange triggered by the [`Command`] failed.
    #[display(fmt = "Negotiation failed: {}", _0)]
    Negotiation(String),

    /// Endpoint has been disconnected before the [`Command`] completed.
    #[display(fmt = "Endpoint disconnected")]
    Disconnected,

    /// Track of the [`MediaKind`] is not allowed to be published.
    #[display(fmt = "Publishing {} tracks is not allowed", _0)]
    TrackType(MediaKind),

    /// No local track with the [`TrackId`] exists.
    #[display(fmt = "Unknown track `{}`", _0)]
    UnknownTrack(TrackId),

    /// [`CommandsQueue`] has been dropped with the [`Command`] inside.
    #[display(fmt = "Command has been dropped unsettled")]
    Dropped,
}

/// Result of a [`Command`] handler or validation.
pub type CommandResult = Result<(), Traced<CommandError>>;

/// When the [`Command`] is considered complete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Resolve {
    /// Right after its handler returns.
    Immediately,

    /// Once the connection returns to quiescence after the handler's
    /// effects, or once an external event settles it.
    AfterRenegotiation,
}

/// Unit of work mutating the connection.
pub struct Command {
    /// Preconditions checked right before the handler runs.
    validate: Option<Box<dyn FnOnce() -> CommandResult>>,

    /// Mutation itself.
    handler: Box<dyn FnOnce() -> CommandResult>,

    /// When this [`Command`] is considered complete.
    resolve: Resolve,

    /// Notifies the caller about completion of this [`Command`].
    notifier: Deferred<(), Traced<CommandError>>,
}

impl Command {
    /// Creates a new [`Command`] running the provided `handler`.
    ///
    /// Returns the [`Command`] along with the [`Future`] resolving once it
    /// completes.
    ///
    /// [`Future`]: std::future::Future
    pub fn new<H>(
        handler: H,
        resolve: Resolve,
    ) -> (Self, LocalBoxFuture<'static, CommandResult>)
    where
        H: FnOnce() -> CommandResult + 'static,
    {
        let (notifier, settled) = Deferred::new();
        let cmd = Self {
            validate: None,
            handler: Box::new(handler),
            resolve,
            notifier,
        };
        let completion = settled
            .map(|res| {
                res.unwrap_or_else(|_| {
                    Err(tracerr::new!(CommandError::Dropped))
                })
            })
            .boxed_local();
        (cmd, completion)
    }

    /// Adds preconditions to this [`Command`], its handler is never run if
    /// they fail.
    #[must_use]
    pub fn with_validation<V>(mut self, validate: V) -> Self
    where
        V: FnOnce() -> CommandResult + 'static,
    {
        self.validate = Some(Box::new(validate));
        self
    }
}

/// Queue applying [`Command`]s one at a time, in submission order, only when
/// the connection can safely accept a mutation.
///
/// Every [`Command`] is settled exactly once.
pub struct CommandsQueue {
    /// Source of the connection and the [`NegotiationPhase`].
    state: Rc<StateManager>,

    /// [`Command`]s waiting for dispatch.
    commands: RefCell<VecDeque<Command>>,

    /// Notifier of the dispatched [`Command`] waiting for quiescence.
    outstanding: RefCell<Option<Deferred<(), Traced<CommandError>>>>,

    /// Readiness observer of the live connection.
    connection_listener: RefCell<Option<EventListener>>,

    /// Indicator whether a [`Command`] handler is running right now.
    dispatching: Cell<bool>,
}

impl CommandsQueue {
    /// Creates a new empty [`CommandsQueue`].
    #[must_use]
    pub fn new(state: Rc<StateManager>) -> Self {
        Self {
            state,
            commands: RefCell::new(VecDeque::new()),
            outstanding: RefCell::new(None),
            connection_listener: RefCell::new(None),
            dispatching: Cell::new(false),
        }
    }

    /// Appends the provided [`Command`] to the tail of this
    /// [`CommandsQueue`] and attempts dispatch.
    pub fn push_command(&self, command: Command) {
        self.commands.borrow_mut().push_back(command);
        self.process_next_command();
    }

    /// Observes readiness transitions of the provided `connection`,
    /// attempting dispatch on each one.
    ///
    /// Replaces any previous observation.
    pub fn setup_event_listeners(
        self: &Rc<Self>,
        connection: &Rc<dyn RtcPeerConnection>,
    ) {
        let weak_this = Rc::downgrade(self);
        let id = connection.add_event_listener(Box::new(move |event| {
            let unblocks = matches!(
                event,
                PeerConnectionEvent::SignalingStateChange(
                    SignalingState::Stable
                ) | PeerConnectionEvent::ConnectionStateChange(
                    PeerConnectionState::Connected
                ) | PeerConnectionEvent::IceConnectionStateChange(
                    IceConnectionState::Connected
                ) | PeerConnectionEvent::IceGatheringStateChange(
                    IceGatheringState::Complete
                )
            );
            if unblocks {
                if let Some(this) = weak_this.upgrade() {
                    this.process_next_command();
                }
            }
        }));

        let connection = Rc::clone(connection);
        let listener = EventListener::new("readiness", move || {
            connection.remove_event_listener(id);
        });
        let previous = self.connection_listener.replace(Some(listener));
        drop(previous);
    }

    /// Dispatches the next [`Command`] if no exchange is in progress and the
    /// connection is quiescent.
    ///
    /// Resolves the outstanding [`Command`] beforehand, since reaching this
    /// point means its effects have been applied.
    pub fn process_next_command(&self) {
        if self.dispatching.get() {
            return;
        }
        if self.state.negotiation_phase() != NegotiationPhase::Idle {
            return;
        }
        if !self.state.is_connection_ready() {
            return;
        }

        self.resolve_outstanding();

        let next = self.commands.borrow_mut().pop_front();
        if let Some(command) = next {
            self.handle_command(command);
        }
    }

    /// Runs the provided [`Command`] and settles it according to its
    /// [`Resolve`] policy.
    fn handle_command(&self, command: Command) {
        let Command {
            validate,
            handler,
            resolve,
            notifier,
        } = command;

        self.dispatching.set(true);
        let result = validate.map_or(Ok(()), |validate| {
            (validate)().map_err(|e| {
                log::warn!("Command validation failed: {}", e);
                e
            })
        });
        let result = result.and_then(|_| {
            log::debug!("Dispatching command ({:?})", resolve);
            (handler)()
        });
        self.dispatching.set(false);

        match (result, resolve) {
            (Err(e), _) => {
                notifier.reject(e);
            }
            (Ok(()), Resolve::Immediately) => {
                notifier.resolve(());
            }
            (Ok(()), Resolve::AfterRenegotiation) => {
                self.outstanding.replace(Some(notifier));
            }
        }

        self.process_next_command();
    }

    /// Resolves the outstanding [`Command`], if any.
    pub fn resolve_outstanding(&self) {
        let outstanding = self.outstanding.borrow_mut().take();
        if let Some(notifier) = outstanding {
            notifier.resolve(());
        }
    }

    /// Rejects the outstanding [`Command`], if any, with the provided
    /// `err`.
    pub fn reject_outstanding(&self, err: Traced<CommandError>) {
        let outstanding = self.outstanding.borrow_mut().take();
        if let Some(notifier) = outstanding {
            notifier.reject(err);
        }
    }

    /// Indicates whether a dispatched [`Command`] waits for quiescence.
    #[inline]
    #[must_use]
    pub fn has_outstanding(&self) -> bool {
        self.outstanding.borrow().is_some()
    }

    /// Returns count of the [`Command`]s waiting for dispatch.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.borrow().len()
    }

    /// Indicates whether no [`Command`] waits for dispatch.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.borrow().is_empty()
    }

    /// Rejects the outstanding [`Command`] and every queued one with
    /// [`CommandError::Disconnected`], and stops observing the connection.
    ///
    /// This [`CommandsQueue`] stays usable afterwards.
    pub fn clean_up(&self) {
        self.reject_outstanding(tracerr::new!(CommandError::Disconnected));

        let drained: Vec<_> = self.commands.borrow_mut().drain(..).collect();
        for command in drained {
            command
                .notifier
                .reject(tracerr::new!(CommandError::Disconnected));
        }

        let listener = self.connection_listener.borrow_mut().take();
        drop(listener);
    }
}
