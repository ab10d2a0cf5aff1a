//! Handling of signaling messages received from the media server.

use std::{collections::HashMap, rc::Rc};

use medea_media_event_proto::{
    ClientCustomEvent, ClientEvent, CustomEvent, Encoding, EncodingReason,
    EndpointId, EndpointInfo, MediaEventHandler, Metadata, TrackId, TrackInfo,
    TurnServer,
};
use tracerr::Traced;

use crate::{
    commands_queue::CommandError,
    conf::IceServer,
    platform::{
        PeerConnectionEvent, PeerConnectionState, RtcConfiguration,
        RtcPeerConnection, RtcPeerConnectionError,
    },
    utils::EventListener,
};

use super::{ConnectionStatus, EndpointEvent, Inner, WebRtcEndpoint};

impl MediaEventHandler for WebRtcEndpoint {
    type Output = ();

    fn on_connected(&self, id: EndpointId, other_endpoints: Vec<EndpointInfo>) {
        let this = &self.0;
        log::info!("Connected as `{}`", id);
        this.local_endpoint_id.replace(Some(id.clone()));
        this.status.set(ConnectionStatus::Connected);

        let added: Vec<_> = {
            let mut registry = this.registry.borrow_mut();
            other_endpoints
                .into_iter()
                .filter(|e| e.id != id)
                .filter_map(|e| registry.add_endpoint(e))
                .collect()
        };
        this.events.emit(EndpointEvent::Connected {
            endpoint_id: id,
            other_endpoints: added.iter().map(|(e, _)| e.clone()).collect(),
        });
        for (endpoint, tracks) in added {
            this.events.emit(EndpointEvent::EndpointAdded(endpoint));
            for track in tracks {
                this.events.emit(EndpointEvent::TrackAdded(track));
            }
        }

        let has_remote_tracks = this.registry.borrow().has_tracks();
        if has_remote_tracks || !this.state.local_tracks().is_empty() {
            this.negotiation.request_renegotiation();
        }
    }

    fn on_endpoint_added(
        &self,
        id: EndpointId,
        endpoint_type: String,
        metadata: Metadata,
    ) {
        let this = &self.0;
        if this.local_endpoint_id.borrow().as_ref() == Some(&id) {
            return;
        }
        let added = this.registry.borrow_mut().add_endpoint(EndpointInfo {
            id,
            endpoint_type,
            metadata,
            tracks: HashMap::new(),
        });
        if let Some((endpoint, _)) = added {
            this.events.emit(EndpointEvent::EndpointAdded(endpoint));
        }
    }

    fn on_endpoint_removed(&self, id: EndpointId) {
        let this = &self.0;
        let removed = this.registry.borrow_mut().remove_endpoint(&id);
        if let Some((endpoint, tracks)) = removed {
            for track in tracks {
                this.events.emit(EndpointEvent::TrackRemoved(track));
            }
            this.events.emit(EndpointEvent::EndpointRemoved(endpoint));
        }
    }

    fn on_endpoint_updated(&self, id: EndpointId, metadata: Metadata) {
        let this = &self.0;
        let updated = this.registry.borrow_mut().update_endpoint(&id, metadata);
        if let Some(endpoint) = updated {
            this.events.emit(EndpointEvent::EndpointUpdated(endpoint));
        }
    }

    fn on_tracks_added(
        &self,
        endpoint_id: EndpointId,
        tracks: HashMap<TrackId, TrackInfo>,
    ) {
        let this = &self.0;
        if this.local_endpoint_id.borrow().as_ref() == Some(&endpoint_id) {
            return;
        }
        let added = this.registry.borrow_mut().add_tracks(&endpoint_id, tracks);
        for track in added {
            this.events.emit(EndpointEvent::TrackAdded(track));
        }
    }

    fn on_tracks_removed(
        &self,
        endpoint_id: EndpointId,
        track_ids: Vec<TrackId>,
    ) {
        let this = &self.0;
        let removed = this
            .registry
            .borrow_mut()
            .remove_tracks(&endpoint_id, &track_ids);
        for track in removed {
            this.events.emit(EndpointEvent::TrackRemoved(track));
        }
    }

    fn on_track_updated(
        &self,
        endpoint_id: EndpointId,
        track_id: TrackId,
        metadata: Metadata,
    ) {
        let this = &self.0;
        let updated = this
            .registry
            .borrow_mut()
            .update_track(&endpoint_id, &track_id, |t| t.metadata = metadata);
        if let Some(track) = updated {
            this.events.emit(EndpointEvent::TrackUpdated(track));
        }
    }

    fn on_encoding_switched(
        &self,
        endpoint_id: EndpointId,
        track_id: TrackId,
        encoding: Encoding,
        reason: EncodingReason,
    ) {
        let this = &self.0;
        let updated = this
            .registry
            .borrow_mut()
            .update_track(&endpoint_id, &track_id, |t| {
                t.encoding = Some(encoding)
            });
        if let Some(track) = updated {
            this.events
                .emit(EndpointEvent::TrackEncodingChanged { track, reason });
        }
    }

    fn on_custom(&self, event: CustomEvent) {
        let this = &self.0;
        match event {
            CustomEvent::OfferData {
                tracks_types,
                integrated_turn_servers,
            } => {
                if let Err(e) = this.ensure_connection(integrated_turn_servers)
                {
                    this.events
                        .emit(EndpointEvent::ConnectionError(e.to_string()));
                    this.negotiation.finish(Err(tracerr::new!(
                        CommandError::Negotiation(e.to_string())
                    )));
                    return;
                }
                this.negotiation.on_offer_data(tracks_types);
            }
            CustomEvent::SdpAnswer {
                sdp,
                mid_to_track_id,
            } => this.negotiation.on_sdp_answer(sdp, mid_to_track_id),
            CustomEvent::Candidate(candidate) => {
                this.negotiation.on_remote_candidate(candidate);
            }
            CustomEvent::VadNotification { track_id, status } => {
                let updated = this
                    .registry
                    .borrow_mut()
                    .update_track_by_id(&track_id, |t| t.vad = status);
                if updated.is_some() {
                    this.events.emit(EndpointEvent::VoiceActivityChanged {
                        track_id,
                        status,
                    });
                }
            }
            CustomEvent::BandwidthEstimation { estimation } => {
                this.events.emit(EndpointEvent::BandwidthEstimationChanged(
                    estimation,
                ));
            }
        }
    }

    fn on_error(&self, message: String) {
        log::error!("Media server error: {}", message);
        self.0.events.emit(EndpointEvent::ConnectionError(message));
    }

    fn on_disconnected(&self) {
        if self.status() == ConnectionStatus::Disconnected {
            return;
        }
        self.0.tear_down();
    }
}

impl Inner {
    /// Creates the connection if there is none yet and starts observing it.
    fn ensure_connection(
        self: &Rc<Self>,
        turn_servers: Vec<TurnServer>,
    ) -> Result<(), Traced<RtcPeerConnectionError>> {
        if self.state.connection().is_some() {
            return Ok(());
        }

        let mut ice_servers = self.conf.rtc.ice_servers.clone();
        ice_servers.extend(turn_servers.into_iter().map(|t| IceServer {
            urls: vec![t.url()],
            username: Some(t.username),
            credential: Some(t.password),
        }));
        let connection = (self.factory)(RtcConfiguration {
            ice_servers,
            ice_transport_policy: self.conf.rtc.ice_transport_policy,
        })
        .map_err(tracerr::wrap!())?;
        log::debug!("Peer connection created");

        self.state.set_connection(Rc::clone(&connection));
        self.queue.setup_event_listeners(&connection);
        let listener = self.observe_connection(&connection);
        let previous = self.connection_listener.replace(Some(listener));
        drop(previous);
        Ok(())
    }

    /// Forwards local ICE candidates to the media server and binds arriving
    /// media to the [`RemoteTrack`]s.
    ///
    /// [`RemoteTrack`]: super::RemoteTrack
    fn observe_connection(
        self: &Rc<Self>,
        connection: &Rc<dyn RtcPeerConnection>,
    ) -> EventListener {
        let weak_this = Rc::downgrade(self);
        let id = connection.add_event_listener(Box::new(move |event| {
            if let Some(this) = weak_this.upgrade() {
                this.on_connection_event(event);
            }
        }));

        let connection = Rc::clone(connection);
        EventListener::new("connection", move || {
            connection.remove_event_listener(id);
        })
    }

    fn on_connection_event(&self, event: PeerConnectionEvent) {
        match event {
            PeerConnectionEvent::IceCandidate(candidate) => {
                self.events.send_media_event(&ClientEvent::Custom(
                    ClientCustomEvent::Candidate(candidate),
                ));
            }
            PeerConnectionEvent::Track { mid, track } => {
                let track_id =
                    match mid.and_then(|mid| self.state.remote_track_id(&mid)) {
                        Some(id) => id,
                        None => {
                            log::warn!(
                                "Track `{}` arrived unannounced",
                                track.id(),
                            );
                            return;
                        }
                    };
                let ready = self
                    .registry
                    .borrow_mut()
                    .update_track_by_id(&track_id, |t| t.track = Some(track));
                if let Some(track) = ready {
                    self.events.emit(EndpointEvent::TrackReady(track));
                }
            }
            PeerConnectionEvent::ConnectionStateChange(
                PeerConnectionState::Failed,
            ) => {
                log::error!("Peer connection failed");
                self.events.emit(EndpointEvent::ConnectionError(
                    "peer connection failed".to_owned(),
                ));
            }
            PeerConnectionEvent::SignalingStateChange(_)
            | PeerConnectionEvent::ConnectionStateChange(_)
            | PeerConnectionEvent::IceConnectionStateChange(_)
            | PeerConnectionEvent::IceGatheringStateChange(_) => {}
        }
    }
}
