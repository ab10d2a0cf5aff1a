//! SDP offer/answer exchange driven by local and remote changes.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use medea_media_event_proto::{
    ClientCustomEvent, ClientEvent, IceCandidate, MediaKind, Metadata,
    SessionDescription, TrackBitrates, TrackId, TracksTypes,
};
use tracerr::Traced;

use crate::{
    commands_queue::{CommandError, CommandsQueue},
    conf,
    endpoint::EventSink,
    platform::{
        self, kbps_to_bps, RtcPeerConnection, SdpType,
        SendEncodingParameters, TransceiverDirection, TransceiverInit,
    },
    state::{LocalTrack, NegotiationPhase, StateManager},
};

/// Maximal number of remote tracks of a single [`MediaKind`] a connection
/// receives.
pub const MAX_REMOTE_TRACKS_PER_KIND: u32 = 1024;

/// Driver of renegotiations.
///
/// At most one renegotiation is active at a time. Requests arriving while one
/// is active are coalesced into a single follow-up.
pub struct NegotiationManager {
    /// Source of the connection, the local tracks and the
    /// [`NegotiationPhase`].
    state: Rc<StateManager>,

    /// Queue resumed once a renegotiation finishes.
    queue: Rc<CommandsQueue>,

    /// Destination of outbound signaling messages.
    events: Rc<EventSink>,

    /// Simulcast settings of the sent video.
    simulcast: conf::Simulcast,

    /// Indicator whether a renegotiation has been requested while another
    /// one was active.
    pending: Cell<bool>,

    /// Remote offer request received during a track replacement.
    deferred_offer: RefCell<Option<TracksTypes>>,
}

impl NegotiationManager {
    /// Creates a new [`NegotiationManager`].
    #[must_use]
    pub fn new(
        state: Rc<StateManager>,
        queue: Rc<CommandsQueue>,
        events: Rc<EventSink>,
        simulcast: conf::Simulcast,
    ) -> Self {
        Self {
            state,
            queue,
            events,
            simulcast,
            pending: Cell::new(false),
            deferred_offer: RefCell::new(None),
        }
    }

    /// Indicates whether an offer/answer exchange is in progress.
    #[inline]
    #[must_use]
    pub fn ongoing_renegotiation(&self) -> bool {
        self.state.ongoing_renegotiation()
    }

    /// Asks the remote side for a new offer/answer exchange.
    ///
    /// Coalesced into a single follow-up request if an exchange is in
    /// progress already.
    pub fn request_renegotiation(&self) {
        if self.state.negotiation_phase() != NegotiationPhase::Idle {
            log::debug!("Renegotiation is coalesced with the active one");
            self.pending.set(true);
            return;
        }
        self.state
            .set_negotiation_phase(NegotiationPhase::Renegotiating);
        self.events.send_media_event(&ClientEvent::Custom(
            ClientCustomEvent::RenegotiateTracks,
        ));
    }

    /// Handles the remote request for an SDP offer.
    ///
    /// Attaches every local track not being sent yet, makes the connection
    /// receive the announced `tracks_types` and sends a new SDP offer.
    ///
    /// Deferred until the active track replacement completes, if any.
    pub fn on_offer_data(self: &Rc<Self>, tracks_types: TracksTypes) {
        if self.state.ongoing_track_replacement() {
            log::debug!("Offer request deferred until track is replaced");
            self.deferred_offer.replace(Some(tracks_types));
            return;
        }
        self.state
            .set_negotiation_phase(NegotiationPhase::Renegotiating);

        let connection = match self.state.connection() {
            Some(conn) => conn,
            None => {
                self.finish(Err(tracerr::new!(CommandError::Negotiation(
                    "no connection to create offer on".to_owned(),
                ))));
                return;
            }
        };
        if let Err(e) = self.attach_transceivers(&connection, tracks_types) {
            self.finish(Err(e));
            return;
        }

        let this = Rc::downgrade(self);
        platform::spawn(async move {
            let offer = async {
                let sdp = connection
                    .create_offer()
                    .await
                    .map_err(|e| negotiation_error(&e))?;
                connection
                    .set_local_description(SdpType::Offer(sdp.clone()))
                    .await
                    .map_err(|e| negotiation_error(&e))?;
                Ok::<_, Traced<CommandError>>(sdp)
            }
            .await;

            let this = match this.upgrade() {
                Some(this) => this,
                None => return,
            };
            if !this.state.is_current_connection(&connection) {
                return;
            }
            match offer {
                Ok(sdp) => this.send_sdp_offer(sdp),
                Err(e) => this.finish(Err(e)),
            }
        });
    }

    /// Handles the remote SDP answer to the last sent offer and finishes the
    /// active renegotiation once it's applied.
    pub fn on_sdp_answer(
        self: &Rc<Self>,
        sdp: String,
        mid_to_track_id: HashMap<String, TrackId>,
    ) {
        self.state.set_remote_mids(mid_to_track_id);

        let connection = match self.state.connection() {
            Some(conn) => conn,
            None => {
                self.finish(Err(tracerr::new!(CommandError::Negotiation(
                    "SDP answer received without connection".to_owned(),
                ))));
                return;
            }
        };

        let this = Rc::downgrade(self);
        platform::spawn(async move {
            let applied = connection
                .set_remote_description(SdpType::Answer(sdp))
                .await
                .map_err(|e| negotiation_error(&e));

            if let Some(this) = this.upgrade() {
                if this.state.is_current_connection(&connection) {
                    this.finish(applied);
                }
            }
        });
    }

    /// Adds the provided remote [`IceCandidate`] to the connection.
    pub fn on_remote_candidate(&self, candidate: IceCandidate) {
        let connection = match self.state.connection() {
            Some(conn) => conn,
            None => {
                log::warn!("Remote ICE candidate dropped: no connection");
                return;
            }
        };
        platform::spawn(async move {
            if let Err(e) = connection.add_ice_candidate(candidate).await {
                log::error!("{}", e);
            }
        });
    }

    /// Finishes the active renegotiation with the provided `result`.
    ///
    /// Rejects the outstanding command on failure. Sends the coalesced
    /// follow-up request if there is one, or resumes the queue otherwise.
    pub fn finish(&self, result: Result<(), Traced<CommandError>>) {
        if self.state.ongoing_renegotiation() {
            self.state.set_negotiation_phase(NegotiationPhase::Idle);
        }
        if let Err(e) = result {
            log::error!("{}", e);
            self.queue.reject_outstanding(e);
        }

        if self.pending.replace(false) {
            self.request_renegotiation();
        } else {
            self.queue.process_next_command();
        }
    }

    /// Resumes work blocked by a track replacement once it completes.
    pub fn on_track_replacement_finished(self: &Rc<Self>) {
        let deferred = self.deferred_offer.borrow_mut().take();
        if let Some(tracks_types) = deferred {
            self.on_offer_data(tracks_types);
        } else if self.pending.replace(false) {
            self.request_renegotiation();
        } else {
            self.queue.process_next_command();
        }
    }

    /// Forgets any coalesced or deferred request.
    pub fn reset(&self) {
        self.pending.set(false);
        self.deferred_offer.replace(None);
    }

    /// Creates sending [`Transceiver`]s for the local tracks lacking them
    /// and receive-only ones up to the announced `tracks_types`.
    ///
    /// [`Transceiver`]: crate::platform::Transceiver
    fn attach_transceivers(
        &self,
        connection: &Rc<dyn RtcPeerConnection>,
        tracks_types: TracksTypes,
    ) -> Result<(), Traced<CommandError>> {
        for kind in &[MediaKind::Audio, MediaKind::Video] {
            let count = tracks_types.count(*kind);
            if count > MAX_REMOTE_TRACKS_PER_KIND {
                return Err(tracerr::new!(CommandError::Negotiation(format!(
                    "{} remote {} tracks announced, at most {} supported",
                    count, kind, MAX_REMOTE_TRACKS_PER_KIND,
                ))));
            }
        }

        for track in self.state.local_tracks() {
            if track.transceiver.is_some() {
                continue;
            }
            let transceiver = connection
                .add_transceiver(self.send_init(&track))
                .map_err(|e| negotiation_error(&e))?;
            self.state.update_local_track(&track.id, |t| {
                t.transceiver = Some(transceiver);
            });
        }

        for kind in &[MediaKind::Audio, MediaKind::Video] {
            let expected = tracks_types.count(*kind) as usize;
            let present = self.state.receivers_count(*kind);
            for _ in present..expected {
                let transceiver = connection
                    .add_transceiver(TransceiverInit::recv_only(*kind))
                    .map_err(|e| negotiation_error(&e))?;
                self.state.add_receiver(transceiver);
            }
        }

        Ok(())
    }

    /// Builds [`TransceiverInit`] sending the provided [`LocalTrack`].
    fn send_init(&self, track: &LocalTrack) -> TransceiverInit {
        let send_encodings = match track.bitrates(&self.simulcast.encodings) {
            TrackBitrates::Simulcast(limits) => self
                .simulcast
                .encodings
                .iter()
                .map(|e| SendEncodingParameters {
                    rid: Some(*e),
                    active: track.simulcast.active_encodings.contains(e),
                    max_bitrate: limits
                        .get(e)
                        .copied()
                        .filter(|kbps| *kbps > 0)
                        .map(kbps_to_bps),
                    scale_resolution_down_by:
                        conf::Simulcast::scale_resolution_down_by(*e),
                })
                .collect(),
            TrackBitrates::Single(kbps) => vec![SendEncodingParameters {
                rid: None,
                active: true,
                max_bitrate: Some(kbps).filter(|k| *k > 0).map(kbps_to_bps),
                scale_resolution_down_by: 1.0,
            }],
        };
        TransceiverInit {
            kind: track.kind(),
            direction: TransceiverDirection::SendOnly,
            track: Some(Rc::clone(&track.track)),
            send_encodings,
        }
    }

    /// Sends the applied local SDP offer along with the description of every
    /// sent track.
    fn send_sdp_offer(&self, sdp: String) {
        let tracks = self.state.local_tracks();
        let track_id_to_track_metadata: HashMap<TrackId, Metadata> = tracks
            .iter()
            .map(|t| (t.id.clone(), t.metadata.clone()))
            .collect();
        let track_id_to_track_bitrates = tracks
            .iter()
            .map(|t| (t.id.clone(), t.bitrates(&self.simulcast.encodings)))
            .collect();

        self.events.send_media_event(&ClientEvent::Custom(
            ClientCustomEvent::SdpOffer {
                sdp_offer: SessionDescription::offer(sdp),
                track_id_to_track_metadata,
                track_id_to_track_bitrates,
                mid_to_track_id: self.state.local_mids(),
            },
        ));
    }
}

/// Converts a platform error into [`CommandError::Negotiation`].
fn negotiation_error<E: std::fmt::Display>(err: &E) -> Traced<CommandError> {
    tracerr::new!(CommandError::Negotiation(err.to_string()))
}
