//! Single source of truth for the live connection and the state its
//! mutations depend on.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use futures::stream::LocalBoxStream;
use medea_media_event_proto::{
    Encoding, MediaKind, Metadata, SimulcastConfig, TrackBitrates, TrackId,
};
use medea_reactive::ObservableCell;

use crate::platform::{
    IceConnectionState, MediaStreamTrack, PeerConnectionState,
    RtcPeerConnection, SignalingState, Transceiver,
};

/// Phase of a multi-step protocol exchange the connection is going through.
///
/// Commands are dispatched in the [`NegotiationPhase::Idle`] phase only.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NegotiationPhase {
    /// No exchange is in progress.
    Idle,

    /// Local offer/remote answer exchange is in progress.
    Renegotiating,

    /// Source of a negotiated sender is being swapped.
    ReplacingTrack,
}

/// Track published by the local endpoint.
#[derive(Clone)]
pub struct LocalTrack {
    /// ID of this [`LocalTrack`].
    pub id: TrackId,

    /// Media source being sent.
    pub track: Rc<dyn MediaStreamTrack>,

    /// Metadata announced to the other endpoints.
    pub metadata: Metadata,

    /// Simulcast configuration of this [`LocalTrack`].
    pub simulcast: SimulcastConfig,

    /// Bitrate limits in kbps, [`None`] if unlimited.
    pub max_bandwidth: Option<TrackBitrates>,

    /// [`Transceiver`] sending this [`LocalTrack`], [`None`] until the first
    /// offer including it is created.
    pub transceiver: Option<Rc<dyn Transceiver>>,
}

impl LocalTrack {
    /// Returns [`MediaKind`] of this [`LocalTrack`].
    #[inline]
    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.track.kind()
    }

    /// Indicates whether this [`LocalTrack`] is sent with simulcast.
    #[inline]
    #[must_use]
    pub fn is_simulcast(&self) -> bool {
        self.simulcast.enabled
    }

    /// Returns bitrate limits of this [`LocalTrack`] the way they're
    /// announced in an SDP offer, zero meaning unlimited.
    #[must_use]
    pub fn bitrates(&self, encodings: &[Encoding]) -> TrackBitrates {
        match (&self.max_bandwidth, self.is_simulcast()) {
            (Some(TrackBitrates::Simulcast(limits)), true) => {
                TrackBitrates::Simulcast(
                    encodings
                        .iter()
                        .map(|e| (*e, limits.get(e).copied().unwrap_or(0)))
                        .collect(),
                )
            }
            (Some(TrackBitrates::Single(limit)), true) => {
                TrackBitrates::Simulcast(
                    encodings.iter().map(|e| (*e, *limit)).collect(),
                )
            }
            (None, true) => TrackBitrates::Simulcast(
                encodings.iter().map(|e| (*e, 0)).collect(),
            ),
            (Some(TrackBitrates::Single(limit)), false) => {
                TrackBitrates::Single(*limit)
            }
            (Some(TrackBitrates::Simulcast(limits)), false) => {
                TrackBitrates::Single(
                    limits
                        .values()
                        .fold(0_u32, |sum, l| sum.saturating_add(*l)),
                )
            }
            (None, false) => TrackBitrates::Single(0),
        }
    }
}

/// Owner of the connection handle, the [`NegotiationPhase`], the local tracks
/// and the `mid` mappings.
///
/// All readiness checks go through the single connection reference stored
/// here.
pub struct StateManager {
    /// Live connection, [`None`] before the first offer and after
    /// disconnecting.
    connection: RefCell<Option<Rc<dyn RtcPeerConnection>>>,

    /// Current [`NegotiationPhase`].
    phase: ObservableCell<NegotiationPhase>,

    /// Tracks published by the local endpoint, in the order of adding.
    local_tracks: RefCell<Vec<LocalTrack>>,

    /// Receive-only [`Transceiver`]s of the live connection.
    receivers: RefCell<Vec<Rc<dyn Transceiver>>>,

    /// Relations between `mid`s and remote tracks from the last SDP answer.
    remote_mids: RefCell<HashMap<String, TrackId>>,
}

impl StateManager {
    /// Creates a new [`StateManager`] without a connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connection: RefCell::new(None),
            phase: ObservableCell::new(NegotiationPhase::Idle),
            local_tracks: RefCell::new(Vec::new()),
            receivers: RefCell::new(Vec::new()),
            remote_mids: RefCell::new(HashMap::new()),
        }
    }

    /// Returns the live connection, if any.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> Option<Rc<dyn RtcPeerConnection>> {
        self.connection.borrow().clone()
    }

    /// Stores the provided `connection` as the live one.
    pub fn set_connection(&self, connection: Rc<dyn RtcPeerConnection>) {
        *self.connection.borrow_mut() = Some(connection);
    }

    /// Takes the live connection out, forgetting everything bound to it:
    /// [`Transceiver`]s and `mid` mappings.
    ///
    /// Puts the [`NegotiationPhase`] back to [`NegotiationPhase::Idle`].
    pub fn take_connection(&self) -> Option<Rc<dyn RtcPeerConnection>> {
        let connection = self.connection.borrow_mut().take();
        self.receivers.borrow_mut().clear();
        self.remote_mids.borrow_mut().clear();
        for track in self.local_tracks.borrow_mut().iter_mut() {
            track.transceiver = None;
        }
        self.phase.set(NegotiationPhase::Idle);
        connection
    }

    /// Indicates whether the provided `connection` is the live one.
    ///
    /// Lets asynchronous operations detect that the connection they were
    /// started on has been replaced meanwhile.
    #[must_use]
    pub fn is_current_connection(
        &self,
        connection: &Rc<dyn RtcPeerConnection>,
    ) -> bool {
        self.connection.borrow().as_ref().map_or(false, |current| {
            Rc::as_ptr(current) as *const ()
                == Rc::as_ptr(connection) as *const ()
        })
    }

    /// Indicates whether the live connection can safely accept a mutation.
    ///
    /// That is its signaling state is `stable`, and both its connection
    /// state and ICE connection state are `connected`. Always `true` if
    /// there is no connection.
    #[must_use]
    pub fn is_connection_ready(&self) -> bool {
        self.connection().map_or(true, |conn| {
            conn.signaling_state() == SignalingState::Stable
                && conn.connection_state() == PeerConnectionState::Connected
                && conn.ice_connection_state() == IceConnectionState::Connected
        })
    }

    /// Returns the current [`NegotiationPhase`].
    #[inline]
    #[must_use]
    pub fn negotiation_phase(&self) -> NegotiationPhase {
        self.phase.get()
    }

    /// Sets the current [`NegotiationPhase`].
    #[inline]
    pub fn set_negotiation_phase(&self, phase: NegotiationPhase) {
        self.phase.set(phase);
    }

    /// Returns [`LocalBoxStream`] of [`NegotiationPhase`] changes, starting
    /// with the current one.
    #[inline]
    pub fn on_negotiation_phase_change(
        &self,
    ) -> LocalBoxStream<'static, NegotiationPhase> {
        self.phase.subscribe()
    }

    /// Indicates whether an offer/answer exchange is in progress.
    #[inline]
    #[must_use]
    pub fn ongoing_renegotiation(&self) -> bool {
        self.negotiation_phase() == NegotiationPhase::Renegotiating
    }

    /// Indicates whether a track replacement is in progress.
    #[inline]
    #[must_use]
    pub fn ongoing_track_replacement(&self) -> bool {
        self.negotiation_phase() == NegotiationPhase::ReplacingTrack
    }

    /// Enters the [`NegotiationPhase::ReplacingTrack`] phase.
    ///
    /// Returns `false` if another exchange is in progress.
    #[must_use]
    pub fn begin_track_replacement(&self) -> bool {
        if self.negotiation_phase() != NegotiationPhase::Idle {
            return false;
        }
        self.phase.set(NegotiationPhase::ReplacingTrack);
        true
    }

    /// Leaves the [`NegotiationPhase::ReplacingTrack`] phase.
    ///
    /// Must be called on both success and failure of the replacement.
    pub fn finish_track_replacement(&self) {
        if self.ongoing_track_replacement() {
            self.phase.set(NegotiationPhase::Idle);
        }
    }

    /// Adds the provided [`LocalTrack`].
    pub fn add_local_track(&self, track: LocalTrack) {
        self.local_tracks.borrow_mut().push(track);
    }

    /// Removes the [`LocalTrack`] with the provided [`TrackId`].
    pub fn remove_local_track(&self, id: &TrackId) -> Option<LocalTrack> {
        let mut tracks = self.local_tracks.borrow_mut();
        let idx = tracks.iter().position(|t| &t.id == id)?;
        Some(tracks.remove(idx))
    }

    /// Removes all the [`LocalTrack`]s.
    pub fn clear_local_tracks(&self) {
        self.local_tracks.borrow_mut().clear();
    }

    /// Returns the [`LocalTrack`] with the provided [`TrackId`].
    #[must_use]
    pub fn local_track(&self, id: &TrackId) -> Option<LocalTrack> {
        self.local_tracks.borrow().iter().find(|t| &t.id == id).cloned()
    }

    /// Returns all the [`LocalTrack`]s in the order of adding.
    #[must_use]
    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        self.local_tracks.borrow().clone()
    }

    /// Mutates the [`LocalTrack`] with the provided [`TrackId`].
    ///
    /// Returns `false` if there is no such [`LocalTrack`].
    pub fn update_local_track<F>(&self, id: &TrackId, f: F) -> bool
    where
        F: FnOnce(&mut LocalTrack),
    {
        let mut tracks = self.local_tracks.borrow_mut();
        tracks.iter_mut().find(|t| &t.id == id).map(f).is_some()
    }

    /// Registers a receive-only [`Transceiver`] of the live connection.
    pub fn add_receiver(&self, transceiver: Rc<dyn Transceiver>) {
        self.receivers.borrow_mut().push(transceiver);
    }

    /// Returns count of the receive-only [`Transceiver`]s of the provided
    /// [`MediaKind`].
    #[must_use]
    pub fn receivers_count(&self, kind: MediaKind) -> usize {
        self.receivers
            .borrow()
            .iter()
            .filter(|t| t.kind() == kind && t.direction().is_recv())
            .count()
    }

    /// Replaces the `mid` mapping of remote tracks.
    pub fn set_remote_mids(&self, mids: HashMap<String, TrackId>) {
        *self.remote_mids.borrow_mut() = mids;
    }

    /// Returns [`TrackId`] of the remote track received on the provided
    /// `mid`.
    #[must_use]
    pub fn remote_track_id(&self, mid: &str) -> Option<TrackId> {
        self.remote_mids.borrow().get(mid).cloned()
    }

    /// Returns relations between `mid`s and [`LocalTrack`]s being sent.
    #[must_use]
    pub fn local_mids(&self) -> HashMap<String, TrackId> {
        self.local_tracks
            .borrow()
            .iter()
            .filter_map(|t| {
                let mid = t.transceiver.as_ref()?.mid()?;
                Some((mid, t.id.clone()))
            })
            .collect()
    }
}

impl Default for StateManager {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
