//! Events emitted by a [`WebRtcEndpoint`].
//!
//! [`WebRtcEndpoint`]: super::WebRtcEndpoint

use std::rc::Rc;

use derive_more::Display;
use medea_media_event_proto::{
    ClientEvent, Encoding, EncodingReason, EndpointId, Metadata,
    TrackBitrates, TrackId, VadStatus,
};

use crate::utils::{EventEmitter, EventListener};

use super::{Endpoint, RemoteTrack};

/// Lifecycle status of the connection to the media server.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ConnectionStatus {
    /// Not connected, initial and final status.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// `connect` request has been sent, no response yet.
    #[display(fmt = "connecting")]
    Connecting,

    /// Media server has accepted the local endpoint.
    #[display(fmt = "connected")]
    Connected,

    /// Offer/answer exchange is in progress.
    #[display(fmt = "renegotiating")]
    Renegotiating,
}

/// Event emitted by a [`WebRtcEndpoint`].
///
/// [`WebRtcEndpoint`]: super::WebRtcEndpoint
pub enum EndpointEvent {
    /// Media server has accepted the local endpoint.
    Connected {
        /// ID assigned to the local endpoint.
        endpoint_id: EndpointId,

        /// Endpoints already present in the session.
        other_endpoints: Vec<Endpoint>,
    },

    /// Media server or connection reported an error.
    ConnectionError(String),

    /// Local endpoint has been disconnected.
    Disconnected,

    /// Remote [`Endpoint`] joined.
    EndpointAdded(Endpoint),

    /// Remote [`Endpoint`] left.
    EndpointRemoved(Endpoint),

    /// Remote [`Endpoint`] changed its metadata.
    EndpointUpdated(Endpoint),

    /// Remote [`Endpoint`] published a track, media hasn't arrived yet.
    TrackAdded(RemoteTrack),

    /// Media of a [`RemoteTrack`] has arrived.
    TrackReady(RemoteTrack),

    /// Remote [`Endpoint`] unpublished a track.
    TrackRemoved(RemoteTrack),

    /// [`RemoteTrack`] changed its metadata.
    TrackUpdated(RemoteTrack),

    /// Received [`Encoding`] of a [`RemoteTrack`] changed.
    TrackEncodingChanged {
        /// Affected [`RemoteTrack`].
        track: RemoteTrack,

        /// Reason of the change.
        reason: EncodingReason,
    },

    /// Voice activity of a [`RemoteTrack`] changed.
    VoiceActivityChanged {
        /// ID of the [`RemoteTrack`].
        track_id: TrackId,

        /// New voice activity status.
        status: VadStatus,
    },

    /// Media server estimated available bandwidth, in bits per second.
    BandwidthEstimationChanged(f64),

    /// Local track has been added.
    LocalTrackAdded(TrackId),

    /// Local track has been removed.
    LocalTrackRemoved(TrackId),

    /// Source of a local track has been replaced.
    LocalTrackReplaced(TrackId),

    /// Metadata of a local track changed.
    LocalTrackMetadataChanged {
        /// ID of the local track.
        track_id: TrackId,

        /// New metadata.
        metadata: Metadata,
    },

    /// Local track started sending an [`Encoding`].
    LocalTrackEncodingEnabled {
        /// ID of the local track.
        track_id: TrackId,

        /// Enabled [`Encoding`].
        encoding: Encoding,
    },

    /// Local track stopped sending an [`Encoding`].
    LocalTrackEncodingDisabled {
        /// ID of the local track.
        track_id: TrackId,

        /// Disabled [`Encoding`].
        encoding: Encoding,
    },

    /// Bitrate limits of a local track changed.
    LocalTrackBandwidthChanged {
        /// ID of the local track.
        track_id: TrackId,

        /// New limits, [`None`] if unlimited.
        bandwidth: Option<TrackBitrates>,
    },

    /// Serialized signaling message to deliver to the media server.
    SendMediaEvent(String),
}

/// Destination of [`EndpointEvent`]s shared by the endpoint components.
pub struct EventSink(Rc<EventEmitter<EndpointEvent>>);

impl EventSink {
    /// Creates a new [`EventSink`] without listeners.
    #[must_use]
    pub fn new() -> Self {
        Self(EventEmitter::new())
    }

    /// Emits the provided [`EndpointEvent`] to all the listeners.
    #[inline]
    pub fn emit(&self, event: EndpointEvent) {
        self.0.emit(event);
    }

    /// Serializes the provided [`ClientEvent`] and emits it as
    /// [`EndpointEvent::SendMediaEvent`].
    pub fn send_media_event(&self, event: &ClientEvent) {
        match serde_json::to_string(event) {
            Ok(json) => self.emit(EndpointEvent::SendMediaEvent(json)),
            Err(e) => log::error!("Failed to serialize {:?}: {}", event, e),
        }
    }

    /// Subscribes the provided `listener` to all further [`EndpointEvent`]s.
    #[inline]
    pub fn subscribe<F>(&self, listener: F) -> EventListener
    where
        F: Fn(&EndpointEvent) + 'static,
    {
        self.0.subscribe(listener)
    }
}

impl Default for EventSink {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
