//! Public API of a WebRTC endpoint connected to a media server.

mod events;
mod inbound;
mod registry;

use std::{
    cell::RefCell,
    rc::{Rc, Weak},
};

use derive_more::{Display, From};
use futures::{
    future::LocalBoxFuture, stream::LocalBoxStream, FutureExt as _,
    StreamExt as _,
};
use medea_media_event_proto::{
    ClientCustomEvent, ClientEvent, Encoding, EndpointId, MediaEvent,
    MediaKind, Metadata, SimulcastConfig, TrackBitrates, TrackId,
};
use medea_reactive::ObservableCell;
use tracerr::Traced;

use crate::{
    commands_queue::{
        Command, CommandError, CommandResult, CommandsQueue, Resolve,
    },
    conf::Conf,
    negotiation::NegotiationManager,
    platform::{
        self, kbps_to_bps, MediaStreamTrack, PeerConnectionFactory,
    },
    state::{LocalTrack, NegotiationPhase, StateManager},
    utils::EventListener,
};

#[doc(inline)]
pub use self::{
    events::{ConnectionStatus, EndpointEvent, EventSink},
    registry::{Endpoint, RemoteTrack},
};

use self::registry::Registry;

/// Errors returned by [`WebRtcEndpoint`] operations.
#[derive(Clone, Debug, Display, From, Eq, PartialEq)]
pub enum EndpointError {
    /// Inbound signaling message cannot be decoded.
    #[display(fmt = "Failed to parse media event: {}", _0)]
    #[from(ignore)]
    Parse(String),

    /// Operation has been rejected.
    #[display(fmt = "{}", _0)]
    Command(CommandError),
}

/// Client side WebRTC endpoint.
///
/// Serializes mutations of the connection through a [`CommandsQueue`],
/// drives renegotiations and mirrors the state of the remote endpoints.
///
/// All the operations must be called inside a [`tokio::task::LocalSet`].
#[derive(Clone)]
pub struct WebRtcEndpoint(Rc<Inner>);

/// Actual data of a [`WebRtcEndpoint`].
struct Inner {
    /// Application configuration.
    conf: Conf,

    /// Builds connections once the media server asks for an offer.
    factory: PeerConnectionFactory,

    /// Connection, local tracks and [`NegotiationPhase`].
    state: Rc<StateManager>,

    /// Queue of the connection mutations.
    queue: Rc<CommandsQueue>,

    /// Driver of renegotiations.
    negotiation: Rc<NegotiationManager>,

    /// Destination of the emitted [`EndpointEvent`]s.
    events: Rc<EventSink>,

    /// Current [`ConnectionStatus`].
    status: ObservableCell<ConnectionStatus>,

    /// ID assigned to the local endpoint by the media server.
    local_endpoint_id: RefCell<Option<EndpointId>>,

    /// Metadata of the local endpoint.
    local_metadata: RefCell<Metadata>,

    /// Remote endpoints and their tracks.
    registry: RefCell<Registry>,

    /// Observer of ICE candidates and remote tracks of the live connection.
    connection_listener: RefCell<Option<EventListener>>,
}

impl WebRtcEndpoint {
    /// Creates a new disconnected [`WebRtcEndpoint`].
    ///
    /// # Panics
    ///
    /// If called outside of a [`tokio::task::LocalSet`] context.
    #[must_use]
    pub fn new(conf: Conf, factory: PeerConnectionFactory) -> Self {
        let state = Rc::new(StateManager::new());
        let queue = Rc::new(CommandsQueue::new(Rc::clone(&state)));
        let events = Rc::new(EventSink::new());
        let negotiation = Rc::new(NegotiationManager::new(
            Rc::clone(&state),
            Rc::clone(&queue),
            Rc::clone(&events),
            conf.simulcast.clone(),
        ));
        let inner = Rc::new(Inner {
            conf,
            factory,
            state,
            queue,
            negotiation,
            events,
            status: ObservableCell::new(ConnectionStatus::Disconnected),
            local_endpoint_id: RefCell::new(None),
            local_metadata: RefCell::new(Metadata::Null),
            registry: RefCell::new(Registry::default()),
            connection_listener: RefCell::new(None),
        });
        Inner::spawn_status_watcher(&inner);
        Self(inner)
    }

    /// Subscribes the provided `listener` to all the [`EndpointEvent`]s.
    ///
    /// Events are delivered synchronously, the subscription lasts until the
    /// returned [`EventListener`] is dropped.
    pub fn on_event<F>(&self, listener: F) -> EventListener
    where
        F: Fn(&EndpointEvent) + 'static,
    {
        self.0.events.subscribe(listener)
    }

    /// Returns the current [`ConnectionStatus`].
    #[inline]
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.0.status.get()
    }

    /// Returns [`LocalBoxStream`] of [`ConnectionStatus`] changes, starting
    /// with the current one.
    #[inline]
    pub fn on_status_change(
        &self,
    ) -> LocalBoxStream<'static, ConnectionStatus> {
        self.0.status.subscribe()
    }

    /// Returns ID assigned to the local endpoint by the media server.
    #[must_use]
    pub fn local_endpoint_id(&self) -> Option<EndpointId> {
        self.0.local_endpoint_id.borrow().clone()
    }

    /// Returns all the known remote [`Endpoint`]s.
    #[must_use]
    pub fn remote_endpoints(&self) -> Vec<Endpoint> {
        self.0.registry.borrow().endpoints()
    }

    /// Returns all the known [`RemoteTrack`]s.
    #[must_use]
    pub fn remote_tracks(&self) -> Vec<RemoteTrack> {
        self.0.registry.borrow().tracks()
    }

    /// Returns all the [`LocalTrack`]s in the order of adding.
    #[must_use]
    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        self.0.state.local_tracks()
    }

    /// Sends `connect` request with the provided `metadata` of the local
    /// endpoint.
    pub fn connect(&self, metadata: Metadata) {
        if self.status() != ConnectionStatus::Disconnected {
            log::warn!("Endpoint is {} already", self.status());
            return;
        }
        self.0.local_metadata.replace(metadata.clone());
        self.0.status.set(ConnectionStatus::Connecting);
        self.0
            .events
            .send_media_event(&ClientEvent::Connect { metadata });
    }

    /// Disconnects from the media server.
    ///
    /// Rejects every outstanding and queued operation with
    /// [`CommandError::Disconnected`] and closes the connection. Does nothing
    /// if disconnected already.
    pub fn disconnect(&self) {
        if self.status() == ConnectionStatus::Disconnected {
            return;
        }
        self.0.events.send_media_event(&ClientEvent::Disconnect);
        self.0.tear_down();
    }

    /// Decodes the provided serialized signaling message and applies it.
    ///
    /// # Errors
    ///
    /// With [`EndpointError::Parse`] if the message cannot be decoded, the
    /// state is left untouched then.
    pub fn receive_media_event(
        &self,
        raw: &str,
    ) -> Result<(), Traced<EndpointError>> {
        let event: MediaEvent = serde_json::from_str(raw)
            .map_err(|e| tracerr::new!(EndpointError::Parse(e.to_string())))?;
        event.dispatch_with(self);
        Ok(())
    }

    /// Publishes the provided `track`.
    ///
    /// Resolves with ID of the new track once the renegotiation including it
    /// completes.
    ///
    /// # Errors
    ///
    /// With [`CommandError::TrackType`] if tracks of its kind are not
    /// allowed, with [`CommandError::Validation`] if the `simulcast`
    /// configuration is invalid for it, with [`CommandError::Negotiation`]
    /// if the renegotiation fails.
    pub fn add_track(
        &self,
        track: Rc<dyn MediaStreamTrack>,
        metadata: Metadata,
        simulcast: SimulcastConfig,
        max_bandwidth: Option<TrackBitrates>,
    ) -> LocalBoxFuture<'static, Result<TrackId, Traced<EndpointError>>> {
        let track_id = self.0.generate_track_id();
        let kind = track.kind();

        let validate = {
            let conf = self.0.conf.clone();
            let simulcast = simulcast.clone();
            move || {
                if !conf.media.allows(kind) {
                    return Err(tracerr::new!(CommandError::TrackType(kind)));
                }
                if simulcast.enabled && kind == MediaKind::Audio {
                    return Err(tracerr::new!(CommandError::Validation(
                        "audio tracks cannot use simulcast".to_owned(),
                    )));
                }
                let unsupported = simulcast
                    .active_encodings
                    .iter()
                    .find(|e| !conf.simulcast.supports(**e));
                if let Some(encoding) = unsupported {
                    return Err(tracerr::new!(CommandError::Validation(
                        format!("`{}` encoding is not negotiated", encoding),
                    )));
                }
                Ok(())
            }
        };
        let handler = {
            let this = Rc::downgrade(&self.0);
            let track_id = track_id.clone();
            move || {
                let this = upgrade(&this)?;
                let simulcast = this.normalize_simulcast(simulcast);
                this.state.add_local_track(LocalTrack {
                    id: track_id.clone(),
                    track,
                    metadata,
                    simulcast,
                    max_bandwidth,
                    transceiver: None,
                });
                this.renegotiate_if_connected();
                this.events.emit(EndpointEvent::LocalTrackAdded(track_id));
                Ok(())
            }
        };

        let (cmd, done) = Command::new(handler, Resolve::AfterRenegotiation);
        self.0.queue.push_command(cmd.with_validation(validate));
        done.map(move |res| {
            res.map(|_| track_id)
                .map_err(tracerr::map_from_and_wrap!(=> EndpointError))
        })
        .boxed_local()
    }

    /// Replaces the source of the local track without renegotiation,
    /// optionally updating its metadata.
    ///
    /// # Errors
    ///
    /// With [`CommandError::UnknownTrack`] if there is no such local track,
    /// with [`CommandError::Validation`] if kinds of the tracks differ, with
    /// [`CommandError::Negotiation`] if the underlying stack refuses the
    /// replacement.
    pub fn replace_track(
        &self,
        track_id: TrackId,
        new_track: Rc<dyn MediaStreamTrack>,
        new_metadata: Option<Metadata>,
    ) -> LocalBoxFuture<'static, Result<(), Traced<EndpointError>>> {
        let validate = {
            let this = Rc::downgrade(&self.0);
            let track_id = track_id.clone();
            let kind = new_track.kind();
            move || {
                let old = upgrade(&this)?.existing_local_track(&track_id)?;
                if old.kind() != kind {
                    return Err(tracerr::new!(CommandError::Validation(
                        format!(
                            "cannot replace {} track with {}",
                            old.kind(),
                            kind,
                        ),
                    )));
                }
                Ok(())
            }
        };
        let handler = {
            let this = Rc::downgrade(&self.0);
            move || {
                upgrade(&this)?.replace_track(track_id, new_track, new_metadata)
            }
        };

        self.push(Command::new(handler, Resolve::AfterRenegotiation), validate)
    }

    /// Unpublishes the local track.
    ///
    /// # Errors
    ///
    /// With [`CommandError::UnknownTrack`] if there is no such local track,
    /// with [`CommandError::Negotiation`] if the renegotiation fails.
    pub fn remove_track(
        &self,
        track_id: TrackId,
    ) -> LocalBoxFuture<'static, Result<(), Traced<EndpointError>>> {
        let validate = self.0.validate_local_track(track_id.clone());
        let handler = {
            let this = Rc::downgrade(&self.0);
            move || {
                let this = upgrade(&this)?;
                let removed = this
                    .state
                    .remove_local_track(&track_id)
                    .ok_or_else(|| {
                        tracerr::new!(CommandError::UnknownTrack(
                            track_id.clone()
                        ))
                    })?;
                if let (Some(transceiver), Some(conn)) =
                    (removed.transceiver, this.state.connection())
                {
                    conn.remove_transceiver(&transceiver).map_err(|e| {
                        tracerr::new!(CommandError::Negotiation(e.to_string()))
                    })?;
                }
                this.renegotiate_if_connected();
                this.events.emit(EndpointEvent::LocalTrackRemoved(track_id));
                Ok(())
            }
        };

        self.push(Command::new(handler, Resolve::AfterRenegotiation), validate)
    }

    /// Updates metadata of the local track.
    ///
    /// # Errors
    ///
    /// With [`CommandError::UnknownTrack`] if there is no such local track.
    pub fn update_track_metadata(
        &self,
        track_id: TrackId,
        metadata: Metadata,
    ) -> LocalBoxFuture<'static, Result<(), Traced<EndpointError>>> {
        let validate = self.0.validate_local_track(track_id.clone());
        let handler = {
            let this = Rc::downgrade(&self.0);
            move || {
                let this = upgrade(&this)?;
                this.state.update_local_track(&track_id, |t| {
                    t.metadata = metadata.clone();
                });
                this.events.send_media_event(
                    &ClientEvent::UpdateTrackMetadata {
                        track_id: track_id.clone(),
                        track_metadata: metadata.clone(),
                    },
                );
                this.events.emit(EndpointEvent::LocalTrackMetadataChanged {
                    track_id,
                    metadata,
                });
                Ok(())
            }
        };

        self.push(Command::new(handler, Resolve::Immediately), validate)
    }

    /// Starts sending the [`Encoding`] of the local simulcast track.
    ///
    /// # Errors
    ///
    /// With [`CommandError::UnknownTrack`] if there is no such local track,
    /// with [`CommandError::Validation`] if the track doesn't use simulcast
    /// or the [`Encoding`] is not negotiated.
    pub fn enable_track_encoding(
        &self,
        track_id: TrackId,
        encoding: Encoding,
    ) -> LocalBoxFuture<'static, Result<(), Traced<EndpointError>>> {
        self.toggle_track_encoding(track_id, encoding, true)
    }

    /// Stops sending the [`Encoding`] of the local simulcast track.
    ///
    /// # Errors
    ///
    /// With [`CommandError::UnknownTrack`] if there is no such local track,
    /// with [`CommandError::Validation`] if the track doesn't use simulcast
    /// or the [`Encoding`] is not negotiated.
    pub fn disable_track_encoding(
        &self,
        track_id: TrackId,
        encoding: Encoding,
    ) -> LocalBoxFuture<'static, Result<(), Traced<EndpointError>>> {
        self.toggle_track_encoding(track_id, encoding, false)
    }

    /// Changes bitrate limits of the local track, [`None`] removing them.
    ///
    /// # Errors
    ///
    /// With [`CommandError::UnknownTrack`] if there is no such local track.
    pub fn set_track_bandwidth(
        &self,
        track_id: TrackId,
        bandwidth: Option<TrackBitrates>,
    ) -> LocalBoxFuture<'static, Result<(), Traced<EndpointError>>> {
        let validate = self.0.validate_local_track(track_id.clone());
        let handler = {
            let this = Rc::downgrade(&self.0);
            move || {
                let this = upgrade(&this)?;
                this.state.update_local_track(&track_id, |t| {
                    t.max_bandwidth = bandwidth.clone();
                });
                this.apply_bandwidth(&track_id);
                this.events.emit(EndpointEvent::LocalTrackBandwidthChanged {
                    track_id,
                    bandwidth,
                });
                Ok(())
            }
        };

        self.push(Command::new(handler, Resolve::Immediately), validate)
    }

    /// Updates metadata of the local endpoint.
    pub fn update_endpoint_metadata(&self, metadata: Metadata) {
        self.0.local_metadata.replace(metadata.clone());
        self.0.events.send_media_event(
            &ClientEvent::UpdateEndpointMetadata { metadata },
        );
    }

    /// Asks the media server to send the provided [`Encoding`] of the remote
    /// simulcast track.
    ///
    /// # Errors
    ///
    /// With [`CommandError::UnknownTrack`] if there is no such remote track,
    /// with [`CommandError::Validation`] if it doesn't use simulcast or
    /// doesn't send the [`Encoding`].
    pub fn set_target_track_encoding(
        &self,
        track_id: TrackId,
        encoding: Encoding,
    ) -> Result<(), Traced<EndpointError>> {
        {
            let registry = self.0.registry.borrow();
            let track = registry.track(&track_id).ok_or_else(|| {
                tracerr::new!(EndpointError::Command(
                    CommandError::UnknownTrack(track_id.clone())
                ))
            })?;
            if !track.simulcast.enabled {
                return Err(tracerr::new!(EndpointError::Command(
                    CommandError::Validation(format!(
                        "track `{}` doesn't use simulcast",
                        track_id
                    ))
                )));
            }
            if !track.simulcast.active_encodings.contains(&encoding) {
                return Err(tracerr::new!(EndpointError::Command(
                    CommandError::Validation(format!(
                        "track `{}` doesn't send `{}` encoding",
                        track_id, encoding
                    ))
                )));
            }
        }

        self.0.events.send_media_event(&ClientEvent::Custom(
            ClientCustomEvent::SetTargetTrackVariant {
                track_id,
                variant: encoding,
            },
        ));
        Ok(())
    }

    fn toggle_track_encoding(
        &self,
        track_id: TrackId,
        encoding: Encoding,
        enable: bool,
    ) -> LocalBoxFuture<'static, Result<(), Traced<EndpointError>>> {
        let validate = {
            let this = Rc::downgrade(&self.0);
            let track_id = track_id.clone();
            move || {
                let this = upgrade(&this)?;
                let track = this.existing_local_track(&track_id)?;
                if !track.is_simulcast() {
                    return Err(tracerr::new!(CommandError::Validation(
                        format!("track `{}` doesn't use simulcast", track_id),
                    )));
                }
                if !this.conf.simulcast.supports(encoding) {
                    return Err(tracerr::new!(CommandError::Validation(
                        format!("`{}` encoding is not negotiated", encoding),
                    )));
                }
                Ok(())
            }
        };
        let handler = {
            let this = Rc::downgrade(&self.0);
            move || {
                upgrade(&this)?
                    .toggle_track_encoding(track_id, encoding, enable);
                Ok(())
            }
        };

        self.push(Command::new(handler, Resolve::Immediately), validate)
    }

    /// Pushes the provided [`Command`] guarded by `validate`.
    fn push<V>(
        &self,
        (cmd, done): (Command, LocalBoxFuture<'static, CommandResult>),
        validate: V,
    ) -> LocalBoxFuture<'static, Result<(), Traced<EndpointError>>>
    where
        V: FnOnce() -> CommandResult + 'static,
    {
        self.0.queue.push_command(cmd.with_validation(validate));
        done.map(|res| {
            res.map_err(tracerr::map_from_and_wrap!(=> EndpointError))
        })
        .boxed_local()
    }
}

impl Inner {
    /// Mirrors [`NegotiationPhase`] changes into the [`ConnectionStatus`].
    fn spawn_status_watcher(this: &Rc<Self>) {
        let mut phases = this.state.on_negotiation_phase_change();
        let weak_this = Rc::downgrade(this);
        platform::spawn(async move {
            while let Some(phase) = phases.next().await {
                let this = match weak_this.upgrade() {
                    Some(this) => this,
                    None => break,
                };
                match (this.status.get(), phase) {
                    (
                        ConnectionStatus::Connected,
                        NegotiationPhase::Renegotiating,
                    ) => this.status.set(ConnectionStatus::Renegotiating),
                    (ConnectionStatus::Renegotiating, _)
                        if phase != NegotiationPhase::Renegotiating =>
                    {
                        this.status.set(ConnectionStatus::Connected)
                    }
                    _ => {}
                }
            }
        });
    }

    /// Generates a new unique [`TrackId`] of a local track.
    fn generate_track_id(&self) -> TrackId {
        let random = format!("{:032x}", rand::random::<u128>());
        match self.local_endpoint_id.borrow().as_ref() {
            Some(endpoint_id) => format!("{}:{}", endpoint_id, random).into(),
            None => random.into(),
        }
    }

    /// Indicates whether the media server has accepted the local endpoint.
    fn is_connected(&self) -> bool {
        matches!(
            self.status.get(),
            ConnectionStatus::Connected | ConnectionStatus::Renegotiating
        )
    }

    /// Requests a renegotiation if the media server has accepted the local
    /// endpoint, the next `connected` event triggers it otherwise.
    fn renegotiate_if_connected(&self) {
        if self.is_connected() {
            self.negotiation.request_renegotiation();
        }
    }

    /// Returns the local track with the provided [`TrackId`].
    fn existing_local_track(
        &self,
        track_id: &TrackId,
    ) -> Result<LocalTrack, Traced<CommandError>> {
        self.state.local_track(track_id).ok_or_else(|| {
            tracerr::new!(CommandError::UnknownTrack(track_id.clone()))
        })
    }

    /// Returns validation checking existence of the local track.
    fn validate_local_track(
        self: &Rc<Self>,
        track_id: TrackId,
    ) -> impl FnOnce() -> CommandResult + 'static {
        let this = Rc::downgrade(self);
        move || upgrade(&this)?.existing_local_track(&track_id).map(drop)
    }

    /// Fills in the encodings not sent initially.
    fn normalize_simulcast(
        &self,
        mut simulcast: SimulcastConfig,
    ) -> SimulcastConfig {
        if simulcast.enabled {
            simulcast.disabled_encodings = self
                .conf
                .simulcast
                .encodings
                .iter()
                .filter(|e| !simulcast.active_encodings.contains(e))
                .copied()
                .collect();
        } else {
            simulcast.active_encodings.clear();
            simulcast.disabled_encodings.clear();
        }
        simulcast
    }

    /// Swaps the source of the local track, leaving the
    /// [`NegotiationPhase::ReplacingTrack`] phase once done.
    fn replace_track(
        self: &Rc<Self>,
        track_id: TrackId,
        new_track: Rc<dyn MediaStreamTrack>,
        new_metadata: Option<Metadata>,
    ) -> CommandResult {
        let old = self.existing_local_track(&track_id)?;
        if !self.state.begin_track_replacement() {
            return Err(tracerr::new!(CommandError::Validation(
                "another exchange is in progress".to_owned(),
            )));
        }
        self.state.update_local_track(&track_id, |t| {
            t.track = Rc::clone(&new_track);
            if let Some(metadata) = &new_metadata {
                t.metadata = metadata.clone();
            }
        });
        if let Some(metadata) = new_metadata {
            self.events.send_media_event(&ClientEvent::UpdateTrackMetadata {
                track_id: track_id.clone(),
                track_metadata: metadata,
            });
        }

        let (transceiver, connection) =
            match (old.transceiver.clone(), self.state.connection()) {
                (Some(transceiver), Some(connection)) => {
                    (transceiver, connection)
                }
                _ => {
                    self.state.finish_track_replacement();
                    self.events
                        .emit(EndpointEvent::LocalTrackReplaced(track_id));
                    return Ok(());
                }
            };

        let weak_this = Rc::downgrade(self);
        platform::spawn(async move {
            let replaced = transceiver.replace_track(Some(new_track)).await;

            let this = match weak_this.upgrade() {
                Some(this) => this,
                None => return,
            };
            if !this.state.is_current_connection(&connection) {
                return;
            }
            this.state.finish_track_replacement();
            match replaced {
                Ok(()) => {
                    this.events
                        .emit(EndpointEvent::LocalTrackReplaced(track_id));
                }
                Err(e) => {
                    log::error!("{}", e);
                    this.state.update_local_track(&track_id, |t| {
                        t.track = old.track;
                        t.metadata = old.metadata;
                    });
                    this.queue.reject_outstanding(tracerr::new!(
                        CommandError::Negotiation(e.to_string())
                    ));
                }
            }
            this.negotiation.on_track_replacement_finished();
        });
        Ok(())
    }

    /// Moves the [`Encoding`] of the local track between its active and
    /// disabled ones, and toggles it on the sender.
    fn toggle_track_encoding(
        &self,
        track_id: TrackId,
        encoding: Encoding,
        enable: bool,
    ) {
        let mut transceiver = None;
        self.state.update_local_track(&track_id, |t| {
            let simulcast = &mut t.simulcast;
            let (from, to) = if enable {
                (
                    &mut simulcast.disabled_encodings,
                    &mut simulcast.active_encodings,
                )
            } else {
                (
                    &mut simulcast.active_encodings,
                    &mut simulcast.disabled_encodings,
                )
            };
            from.retain(|e| *e != encoding);
            if !to.contains(&encoding) {
                to.push(encoding);
            }
            transceiver = t.transceiver.clone();
        });

        if let Some(transceiver) = transceiver {
            platform::spawn(async move {
                if let Err(e) =
                    transceiver.set_encoding_active(encoding, enable).await
                {
                    log::error!("{}", e);
                }
            });
        }

        let (custom, event) = if enable {
            (
                ClientCustomEvent::EnableTrackEncoding {
                    track_id: track_id.clone(),
                    encoding,
                },
                EndpointEvent::LocalTrackEncodingEnabled { track_id, encoding },
            )
        } else {
            (
                ClientCustomEvent::DisableTrackEncoding {
                    track_id: track_id.clone(),
                    encoding,
                },
                EndpointEvent::LocalTrackEncodingDisabled {
                    track_id,
                    encoding,
                },
            )
        };
        self.events.send_media_event(&ClientEvent::Custom(custom));
        self.events.emit(event);
    }

    /// Applies bitrate limits of the local track to its sender.
    fn apply_bandwidth(&self, track_id: &TrackId) {
        let track = match self.state.local_track(track_id) {
            Some(track) => track,
            None => return,
        };
        let transceiver = match track.transceiver.clone() {
            Some(transceiver) => transceiver,
            None => return,
        };
        let limits: Vec<(Option<Encoding>, u64)> =
            match track.bitrates(&self.conf.simulcast.encodings) {
                TrackBitrates::Single(kbps) => vec![(None, kbps_to_bps(kbps))],
                TrackBitrates::Simulcast(limits) => limits
                    .into_iter()
                    .map(|(e, kbps)| (Some(e), kbps_to_bps(kbps)))
                    .collect(),
            };
        platform::spawn(async move {
            for (encoding, bitrate) in limits {
                if let Err(e) =
                    transceiver.set_max_bitrate(encoding, bitrate).await
                {
                    log::error!("{}", e);
                }
            }
        });
    }

    /// Forgets everything bound to the session with the media server.
    fn tear_down(&self) {
        self.status.set(ConnectionStatus::Disconnected);
        self.local_endpoint_id.replace(None);
        self.registry.borrow_mut().clear();
        let listener = self.connection_listener.borrow_mut().take();
        drop(listener);

        self.negotiation.reset();
        let connection = self.state.take_connection();
        self.state.clear_local_tracks();
        self.queue.clean_up();
        if let Some(connection) = connection {
            connection.close();
        }

        self.events.emit(EndpointEvent::Disconnected);
    }
}

/// Upgrades the provided [`Weak`] reference to the endpoint.
fn upgrade(this: &Weak<Inner>) -> Result<Rc<Inner>, Traced<CommandError>> {
    this.upgrade()
        .ok_or_else(|| tracerr::new!(CommandError::Disconnected))
}
