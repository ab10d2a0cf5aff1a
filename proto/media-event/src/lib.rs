//! Signaling protocol between a WebRTC endpoint client and a media server.
//!
//! Every message is a JSON object of the following shape:
//!
//! ```json
//! {"type": "<camelCase variant>", "data": { ... }}
//! ```
//!
//! Negotiation related messages are nested into a `custom` envelope:
//!
//! ```json
//! {"type": "custom", "data": {"type": "sdpAnswer", "data": { ... }}}
//! ```
//!
//! [`MediaEvent`]s travel from the server to the client, [`ClientEvent`]s
//! travel the other way.

#![forbid(unsafe_code)]

use std::collections::HashMap;

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Free-form metadata attached to endpoints and tracks.
pub type Metadata = serde_json::Value;

/// ID of a remote or local `Endpoint`.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
pub struct EndpointId(pub String);

/// ID of a media track.
#[derive(
    Clone, Debug, Deserialize, Display, Eq, From, Hash, PartialEq, Serialize,
)]
#[from(forward)]
pub struct TrackId(pub String);

/// Kind of a media track.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    #[display(fmt = "audio")]
    Audio,

    /// Video track.
    #[display(fmt = "video")]
    Video,
}

/// Simulcast encoding of a video track.
///
/// Serialized as its [RID][1].
///
/// [1]: https://tools.ietf.org/html/rfc8851
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub enum Encoding {
    /// Low resolution encoding.
    #[serde(rename = "l")]
    #[display(fmt = "l")]
    Low,

    /// Medium resolution encoding.
    #[serde(rename = "m")]
    #[display(fmt = "m")]
    Medium,

    /// High resolution encoding.
    #[serde(rename = "h")]
    #[display(fmt = "h")]
    High,
}

/// Reason of a remote track [`Encoding`] switch.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingReason {
    /// Encoding was switched on the client's request.
    Other,

    /// Previously used encoding became inactive on the sender side.
    EncodingInactive,

    /// Receiver doesn't have enough bandwidth for the previous encoding.
    LowBandwidth,
}

/// Simulcast configuration of a track.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct SimulcastConfig {
    /// Indicator whether simulcast is used for the track.
    pub enabled: bool,

    /// [`Encoding`]s being sent.
    #[serde(rename = "activeEncodings", default)]
    pub active_encodings: Vec<Encoding>,

    /// [`Encoding`]s negotiated but currently not being sent.
    #[serde(rename = "disabledEncodings", default)]
    pub disabled_encodings: Vec<Encoding>,
}

/// Description of a track announced by the server.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct TrackInfo {
    /// Metadata of the track.
    #[serde(default)]
    pub metadata: Metadata,

    /// Simulcast configuration of the track.
    #[serde(rename = "simulcastConfig", default)]
    pub simulcast_config: SimulcastConfig,
}

/// Description of an endpoint announced by the server.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EndpointInfo {
    /// ID of the endpoint.
    pub id: EndpointId,

    /// Type of the endpoint (`webrtc`, `hls`, etc).
    #[serde(rename = "type", default)]
    pub endpoint_type: String,

    /// Metadata of the endpoint.
    #[serde(default)]
    pub metadata: Metadata,

    /// Tracks published by the endpoint.
    #[serde(default)]
    pub tracks: HashMap<TrackId, TrackInfo>,
}

/// [ICE candidate][1] exchanged between peers.
///
/// [1]: https://tools.ietf.org/html/rfc5245#section-2
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IceCandidate {
    /// `candidate` attribute line.
    pub candidate: String,

    /// Index of the m-line the candidate is associated with.
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_m_line_index: Option<u16>,

    /// `mid` of the m-line the candidate is associated with.
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,

    /// ICE username fragment.
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

/// TURN server provided by the media server itself.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TurnServer {
    /// Address of the TURN server.
    #[serde(rename = "serverAddr")]
    pub server_addr: String,

    /// Port of the TURN server.
    #[serde(rename = "serverPort")]
    pub server_port: u16,

    /// Transport of the TURN server (`udp`, `tcp` or `tls`).
    pub transport: String,

    /// Username for the TURN server.
    pub username: String,

    /// Password for the TURN server.
    pub password: String,
}

impl TurnServer {
    /// Returns URL of this [`TurnServer`] suitable for an ICE server list.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.transport == "tls" { "turns" } else { "turn" };
        let transport = if self.transport == "tls" {
            "tcp"
        } else {
            &self.transport
        };
        format!(
            "{}:{}:{}?transport={}",
            scheme, self.server_addr, self.server_port, transport,
        )
    }
}

/// Number of tracks of each kind the server is going to send to the client.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TracksTypes {
    /// Number of audio tracks.
    #[serde(default)]
    pub audio: u32,

    /// Number of video tracks.
    #[serde(default)]
    pub video: u32,
}

impl TracksTypes {
    /// Returns the number of tracks of the provided [`MediaKind`].
    #[inline]
    #[must_use]
    pub fn count(&self, kind: MediaKind) -> u32 {
        match kind {
            MediaKind::Audio => self.audio,
            MediaKind::Video => self.video,
        }
    }
}

/// Voice activity status of a remote audio track.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VadStatus {
    /// Somebody is speaking.
    Speech,

    /// Nobody is speaking.
    Silence,
}

/// Message sent by the media server to the client.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum MediaEvent {
    /// Client has been accepted by the server.
    Connected {
        /// ID assigned to the local endpoint.
        id: EndpointId,

        /// Endpoints already present in the room.
        #[serde(rename = "otherEndpoints", default)]
        other_endpoints: Vec<EndpointInfo>,
    },

    /// New remote endpoint joined.
    EndpointAdded {
        /// ID of the joined endpoint.
        id: EndpointId,

        /// Type of the joined endpoint.
        #[serde(rename = "type", default)]
        endpoint_type: String,

        /// Metadata of the joined endpoint.
        #[serde(default)]
        metadata: Metadata,
    },

    /// Remote endpoint left.
    EndpointRemoved {
        /// ID of the left endpoint.
        id: EndpointId,
    },

    /// Remote endpoint changed its metadata.
    EndpointUpdated {
        /// ID of the updated endpoint.
        id: EndpointId,

        /// New metadata.
        #[serde(default)]
        metadata: Metadata,
    },

    /// Remote endpoint published new tracks.
    TracksAdded {
        /// ID of the publishing endpoint.
        #[serde(rename = "endpointId")]
        endpoint_id: EndpointId,

        /// Published tracks.
        tracks: HashMap<TrackId, TrackInfo>,
    },

    /// Remote endpoint unpublished tracks.
    TracksRemoved {
        /// ID of the unpublishing endpoint.
        #[serde(rename = "endpointId")]
        endpoint_id: EndpointId,

        /// IDs of the unpublished tracks.
        #[serde(rename = "trackIds")]
        track_ids: Vec<TrackId>,
    },

    /// Remote track changed its metadata.
    TrackUpdated {
        /// ID of the endpoint owning the track.
        #[serde(rename = "endpointId")]
        endpoint_id: EndpointId,

        /// ID of the updated track.
        #[serde(rename = "trackId")]
        track_id: TrackId,

        /// New metadata.
        #[serde(default)]
        metadata: Metadata,
    },

    /// Server switched the [`Encoding`] of a received track.
    EncodingSwitched {
        /// ID of the endpoint owning the track.
        #[serde(rename = "endpointId")]
        endpoint_id: EndpointId,

        /// ID of the track.
        #[serde(rename = "trackId")]
        track_id: TrackId,

        /// New [`Encoding`].
        encoding: Encoding,

        /// Reason of the switch.
        reason: EncodingReason,
    },

    /// Negotiation and miscellaneous events.
    Custom(CustomEvent),

    /// Server side error.
    Error {
        /// Description of the error.
        message: String,
    },

    /// Server closed the session.
    Disconnected,
}

/// Negotiation and miscellaneous events sent by the media server.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum CustomEvent {
    /// Server is ready to receive an SDP offer.
    OfferData {
        /// Number of tracks of each kind the server is going to send.
        #[serde(rename = "tracksTypes", default)]
        tracks_types: TracksTypes,

        /// TURN servers of the media server.
        #[serde(rename = "integratedTurnServers", default)]
        integrated_turn_servers: Vec<TurnServer>,
    },

    /// SDP answer to the last sent offer.
    SdpAnswer {
        /// SDP of the answer.
        sdp: String,

        /// Relations between `mid`s and tracks.
        #[serde(rename = "midToTrackId", default)]
        mid_to_track_id: HashMap<String, TrackId>,
    },

    /// Remote ICE candidate.
    Candidate(IceCandidate),

    /// Voice activity changed on a remote track.
    VadNotification {
        /// ID of the track.
        #[serde(rename = "trackId")]
        track_id: TrackId,

        /// New voice activity status.
        status: VadStatus,
    },

    /// Server estimated the client's available bandwidth.
    BandwidthEstimation {
        /// Estimation in bits per second.
        estimation: f64,
    },
}

/// SDP of a local description.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionDescription {
    /// Type of the description, always `offer` for sent descriptions.
    #[serde(rename = "type")]
    pub sdp_type: String,

    /// SDP itself.
    pub sdp: String,
}

impl SessionDescription {
    /// Creates a new offer [`SessionDescription`].
    #[inline]
    #[must_use]
    pub fn offer(sdp: String) -> Self {
        Self {
            sdp_type: "offer".to_owned(),
            sdp,
        }
    }
}

/// Maximal bitrate of a sent track.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TrackBitrates {
    /// Bitrate of a track without simulcast, in kbps.
    Single(u32),

    /// Bitrate per [`Encoding`] of a simulcast track, in kbps.
    Simulcast(HashMap<Encoding, u32>),
}

/// Message sent by the client to the media server.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Request to join with the provided metadata.
    Connect {
        /// Metadata of the local endpoint.
        metadata: Metadata,
    },

    /// Notification about leaving.
    Disconnect,

    /// Local endpoint changed its metadata.
    UpdateEndpointMetadata {
        /// New metadata.
        metadata: Metadata,
    },

    /// Local track changed its metadata.
    UpdateTrackMetadata {
        /// ID of the track.
        #[serde(rename = "trackId")]
        track_id: TrackId,

        /// New metadata.
        #[serde(rename = "trackMetadata")]
        track_metadata: Metadata,
    },

    /// Negotiation and miscellaneous requests.
    Custom(ClientCustomEvent),
}

/// Negotiation and miscellaneous requests sent by the client.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientCustomEvent {
    /// Local tracks changed, server should send [`CustomEvent::OfferData`].
    RenegotiateTracks,

    /// SDP offer of the client.
    SdpOffer {
        /// Offer itself.
        #[serde(rename = "sdpOffer")]
        sdp_offer: SessionDescription,

        /// Metadata of every sent track.
        #[serde(rename = "trackIdToTrackMetadata")]
        track_id_to_track_metadata: HashMap<TrackId, Metadata>,

        /// Bitrates of every sent track.
        #[serde(rename = "trackIdToTrackBitrates")]
        track_id_to_track_bitrates: HashMap<TrackId, TrackBitrates>,

        /// Relations between `mid`s and sent tracks.
        #[serde(rename = "midToTrackId")]
        mid_to_track_id: HashMap<String, TrackId>,
    },

    /// Local ICE candidate.
    Candidate(IceCandidate),

    /// Request to receive the provided [`Encoding`] of a remote track.
    SetTargetTrackVariant {
        /// ID of the remote track.
        #[serde(rename = "trackId")]
        track_id: TrackId,

        /// Requested [`Encoding`].
        variant: Encoding,
    },

    /// Local track started sending the [`Encoding`].
    EnableTrackEncoding {
        /// ID of the local track.
        #[serde(rename = "trackId")]
        track_id: TrackId,

        /// Enabled [`Encoding`].
        encoding: Encoding,
    },

    /// Local track stopped sending the [`Encoding`].
    DisableTrackEncoding {
        /// ID of the local track.
        #[serde(rename = "trackId")]
        track_id: TrackId,

        /// Disabled [`Encoding`].
        encoding: Encoding,
    },
}

/// Handler of [`MediaEvent`] variants.
///
/// Using [`MediaEvent::dispatch_with`] method dispatches [`MediaEvent`]
/// variants to appropriate methods of this trait.
pub trait MediaEventHandler {
    /// Output of every handler method.
    type Output;

    /// Handles [`MediaEvent::Connected`] variant of [`MediaEvent`].
    fn on_connected(
        &self,
        id: EndpointId,
        other_endpoints: Vec<EndpointInfo>,
    ) -> Self::Output;

    /// Handles [`MediaEvent::EndpointAdded`] variant of [`MediaEvent`].
    fn on_endpoint_added(
        &self,
        id: EndpointId,
        endpoint_type: String,
        metadata: Metadata,
    ) -> Self::Output;

    /// Handles [`MediaEvent::EndpointRemoved`] variant of [`MediaEvent`].
    fn on_endpoint_removed(&self, id: EndpointId) -> Self::Output;

    /// Handles [`MediaEvent::EndpointUpdated`] variant of [`MediaEvent`].
    fn on_endpoint_updated(
        &self,
        id: EndpointId,
        metadata: Metadata,
    ) -> Self::Output;

    /// Handles [`MediaEvent::TracksAdded`] variant of [`MediaEvent`].
    fn on_tracks_added(
        &self,
        endpoint_id: EndpointId,
        tracks: HashMap<TrackId, TrackInfo>,
    ) -> Self::Output;

    /// Handles [`MediaEvent::TracksRemoved`] variant of [`MediaEvent`].
    fn on_tracks_removed(
        &self,
        endpoint_id: EndpointId,
        track_ids: Vec<TrackId>,
    ) -> Self::Output;

    /// Handles [`MediaEvent::TrackUpdated`] variant of [`MediaEvent`].
    fn on_track_updated(
        &self,
        endpoint_id: EndpointId,
        track_id: TrackId,
        metadata: Metadata,
    ) -> Self::Output;

    /// Handles [`MediaEvent::EncodingSwitched`] variant of [`MediaEvent`].
    fn on_encoding_switched(
        &self,
        endpoint_id: EndpointId,
        track_id: TrackId,
        encoding: Encoding,
        reason: EncodingReason,
    ) -> Self::Output;

    /// Handles [`MediaEvent::Custom`] variant of [`MediaEvent`].
    fn on_custom(&self, event: CustomEvent) -> Self::Output;

    /// Handles [`MediaEvent::Error`] variant of [`MediaEvent`].
    fn on_error(&self, message: String) -> Self::Output;

    /// Handles [`MediaEvent::Disconnected`] variant of [`MediaEvent`].
    fn on_disconnected(&self) -> Self::Output;
}

impl MediaEvent {
    /// Dispatches [`MediaEvent`] with given [`MediaEventHandler`].
    pub fn dispatch_with<T: MediaEventHandler>(self, handler: &T) -> T::Output {
        match self {
            Self::Connected {
                id,
                other_endpoints,
            } => handler.on_connected(id, other_endpoints),
            Self::EndpointAdded {
                id,
                endpoint_type,
                metadata,
            } => handler.on_endpoint_added(id, endpoint_type, metadata),
            Self::EndpointRemoved { id } => handler.on_endpoint_removed(id),
            Self::EndpointUpdated { id, metadata } => {
                handler.on_endpoint_updated(id, metadata)
            }
            Self::TracksAdded {
                endpoint_id,
                tracks,
            } => handler.on_tracks_added(endpoint_id, tracks),
            Self::TracksRemoved {
                endpoint_id,
                track_ids,
            } => handler.on_tracks_removed(endpoint_id, track_ids),
            Self::TrackUpdated {
                endpoint_id,
                track_id,
                metadata,
            } => handler.on_track_updated(endpoint_id, track_id, metadata),
            Self::EncodingSwitched {
                endpoint_id,
                track_id,
                encoding,
                reason,
            } => handler.on_encoding_switched(
                endpoint_id,
                track_id,
                encoding,
                reason,
            ),
            Self::Custom(event) => handler.on_custom(event),
            Self::Error { message } => handler.on_error(message),
            Self::Disconnected => handler.on_disconnected(),
        }
    }
}
