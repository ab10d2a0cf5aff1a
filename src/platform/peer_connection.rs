//! Abstraction over [RTCPeerConnection][1] of the underlying WebRTC stack.
//!
//! [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection

use std::rc::Rc;

use async_trait::async_trait;
use derive_more::{Display, From};
use medea_media_event_proto::IceCandidate;
use tracerr::Traced;

use crate::{
    conf::{IceServer, IceTransportPolicy},
    platform::{MediaStreamTrack, Transceiver, TransceiverInit},
};

/// Shortcut for a [`Result`] of [`RtcPeerConnection`] operations.
pub type Result<T> = std::result::Result<T, Traced<RtcPeerConnectionError>>;

/// Builds new [`RtcPeerConnection`]s.
pub type PeerConnectionFactory = Box<
    dyn Fn(RtcConfiguration) -> Result<Rc<dyn RtcPeerConnection>>,
>;

/// [RTCSignalingState][1] of a [`RtcPeerConnection`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcsignalingstate
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SignalingState {
    /// There is no offer/answer exchange in progress.
    #[display(fmt = "stable")]
    Stable,

    /// Local offer has been applied, answer is awaited.
    #[display(fmt = "have-local-offer")]
    HaveLocalOffer,

    /// Remote offer has been applied, answer is not created yet.
    #[display(fmt = "have-remote-offer")]
    HaveRemoteOffer,

    /// Remote offer and a local provisional answer have been applied.
    #[display(fmt = "have-local-pranswer")]
    HaveLocalPranswer,

    /// Local offer and a remote provisional answer have been applied.
    #[display(fmt = "have-remote-pranswer")]
    HaveRemotePranswer,

    /// [`RtcPeerConnection`] is closed.
    #[display(fmt = "closed")]
    Closed,
}

/// [RTCPeerConnectionState][1] of a [`RtcPeerConnection`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnectionstate
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PeerConnectionState {
    /// Transports are new or closed and none of them is connecting.
    #[display(fmt = "new")]
    New,

    /// At least one transport is establishing a connection.
    #[display(fmt = "connecting")]
    Connecting,

    /// Every transport is connected or closed.
    #[display(fmt = "connected")]
    Connected,

    /// At least one transport has lost its connection.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// At least one transport has failed.
    #[display(fmt = "failed")]
    Failed,

    /// [`RtcPeerConnection`] is closed.
    #[display(fmt = "closed")]
    Closed,
}

/// [RTCIceConnectionState][1] of a [`RtcPeerConnection`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtciceconnectionstate
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum IceConnectionState {
    /// ICE agent is gathering addresses or waiting for remote candidates.
    #[display(fmt = "new")]
    New,

    /// ICE agent is checking candidate pairs.
    #[display(fmt = "checking")]
    Checking,

    /// Usable candidate pair has been found for every component.
    #[display(fmt = "connected")]
    Connected,

    /// ICE agent has finished gathering and checking.
    #[display(fmt = "completed")]
    Completed,

    /// No compatible candidate pair has been found.
    #[display(fmt = "failed")]
    Failed,

    /// Connectivity checks failed for at least one component.
    #[display(fmt = "disconnected")]
    Disconnected,

    /// ICE agent has shut down.
    #[display(fmt = "closed")]
    Closed,
}

/// [RTCIceGatheringState][1] of a [`RtcPeerConnection`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcicegatheringstate
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum IceGatheringState {
    /// No gathering has happened yet.
    #[display(fmt = "new")]
    New,

    /// ICE agent is gathering candidates.
    #[display(fmt = "gathering")]
    Gathering,

    /// ICE agent has finished gathering candidates.
    #[display(fmt = "complete")]
    Complete,
}

/// Description passed to [`RtcPeerConnection`] SDP setters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SdpType {
    /// [`offer` type][1] of SDP.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype-offer
    Offer(String),

    /// [`answer` type][1] of SDP.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcsdptype-answer
    Answer(String),
}

/// [RTCConfiguration][1] used to build a [`RtcPeerConnection`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcconfiguration
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RtcConfiguration {
    /// ICE servers the ICE agent may use.
    pub ice_servers: Vec<IceServer>,

    /// Candidates the ICE agent is allowed to use.
    pub ice_transport_policy: IceTransportPolicy,
}

/// ID of a handler registered via [`RtcPeerConnection::add_event_listener`].
#[derive(Clone, Copy, Debug, Display, Eq, From, Hash, PartialEq)]
pub struct ListenerId(pub u64);

/// Event fired by a [`RtcPeerConnection`].
#[derive(Clone)]
pub enum PeerConnectionEvent {
    /// [`signalingstatechange`][1] event.
    ///
    /// [1]: https://w3.org/TR/webrtc/#event-signalingstatechange
    SignalingStateChange(SignalingState),

    /// [`connectionstatechange`][1] event.
    ///
    /// [1]: https://w3.org/TR/webrtc/#event-connectionstatechange
    ConnectionStateChange(PeerConnectionState),

    /// [`iceconnectionstatechange`][1] event.
    ///
    /// [1]: https://w3.org/TR/webrtc/#event-iceconnectionstatechange
    IceConnectionStateChange(IceConnectionState),

    /// [`icegatheringstatechange`][1] event.
    ///
    /// [1]: https://w3.org/TR/webrtc/#event-icegatheringstatechange
    IceGatheringStateChange(IceGatheringState),

    /// [`icecandidate`][1] event with a newly discovered local candidate.
    ///
    /// [1]: https://w3.org/TR/webrtc/#event-icecandidate
    IceCandidate(IceCandidate),

    /// [`track`][1] event with a newly received remote track.
    ///
    /// [1]: https://w3.org/TR/webrtc/#event-track
    Track {
        /// `mid` of the transceiver the track has arrived on.
        mid: Option<String>,

        /// Received track.
        track: Rc<dyn MediaStreamTrack>,
    },
}

/// Errors that may occur during signaling between this and remote
/// [RTCPeerConnection][1].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
#[derive(Clone, Debug, Display, Eq, PartialEq)]
pub enum RtcPeerConnectionError {
    /// Remote candidate cannot be added.
    #[display(fmt = "Failed to add ICE candidate: {}", _0)]
    AddIceCandidate(String),

    /// Transceiver cannot be added.
    #[display(fmt = "Failed to add transceiver: {}", _0)]
    AddTransceiver(String),

    /// [`RtcPeerConnection`] cannot be created.
    #[display(fmt = "Failed to create PeerConnection: {}", _0)]
    CreatePeer(String),

    /// SDP offer cannot be obtained.
    #[display(fmt = "Failed to create SDP offer: {}", _0)]
    CreateOffer(String),

    /// Sender of a transceiver cannot be stopped.
    #[display(fmt = "Failed to remove transceiver: {}", _0)]
    RemoveTransceiver(String),

    /// Source of a sender cannot be replaced.
    #[display(fmt = "Failed to replace track: {}", _0)]
    ReplaceTrack(String),

    /// Local description cannot be changed.
    #[display(fmt = "Failed to set local SDP description: {}", _0)]
    SetLocalDescription(String),

    /// Sender parameters cannot be changed.
    #[display(fmt = "Failed to set sender parameters: {}", _0)]
    SetParameters(String),

    /// Remote description cannot be changed.
    #[display(fmt = "Failed to set remote SDP description: {}", _0)]
    SetRemoteDescription(String),
}

/// Representation of [RTCPeerConnection][1].
///
/// Implementations must not hold any internal borrow while calling the
/// registered event handlers, since handlers call back into the
/// [`RtcPeerConnection`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection
#[async_trait(?Send)]
pub trait RtcPeerConnection {
    /// Returns current [`SignalingState`].
    fn signaling_state(&self) -> SignalingState;

    /// Returns current [`PeerConnectionState`].
    fn connection_state(&self) -> PeerConnectionState;

    /// Returns current [`IceConnectionState`].
    fn ice_connection_state(&self) -> IceConnectionState;

    /// Returns current [`IceGatheringState`].
    fn ice_gathering_state(&self) -> IceGatheringState;

    /// Registers the provided `listener` of all the [`PeerConnectionEvent`]s.
    fn add_event_listener(
        &self,
        listener: Box<dyn Fn(PeerConnectionEvent)>,
    ) -> ListenerId;

    /// Unregisters the listener with the provided [`ListenerId`].
    fn remove_event_listener(&self, id: ListenerId);

    /// Creates a new [RTCRtpTransceiver][1].
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::AddTransceiver`] if the underlying
    /// stack refuses the provided [`TransceiverInit`].
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiver
    fn add_transceiver(
        &self,
        init: TransceiverInit,
    ) -> Result<Rc<dyn Transceiver>>;

    /// Stops sending media on the provided [`Transceiver`], the way
    /// [removeTrack()][1] does.
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::RemoveTransceiver`] if the
    /// [`Transceiver`] doesn't belong to this [`RtcPeerConnection`].
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection-removetrack
    fn remove_transceiver(&self, transceiver: &Rc<dyn Transceiver>)
        -> Result<()>;

    /// Obtains [SDP offer][`SdpType::Offer`] from the underlying stack.
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::CreateOffer`] if [createOffer()][1]
    /// fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcpeerconnection-createoffer
    async fn create_offer(&self) -> Result<String>;

    /// Sets local description to the provided [`SdpType`].
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::SetLocalDescription`] if
    /// [setLocalDescription()][1] fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-peerconnection-setlocaldescription
    async fn set_local_description(&self, sdp: SdpType) -> Result<()>;

    /// Sets remote description to the provided [`SdpType`].
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::SetRemoteDescription`] if
    /// [setRemoteDescription()][1] fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-peerconnection-setremotedescription
    async fn set_remote_description(&self, sdp: SdpType) -> Result<()>;

    /// Adds a remote [`IceCandidate`].
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::AddIceCandidate`] if
    /// [addIceCandidate()][1] fails.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-peerconnection-addicecandidate
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Closes this [`RtcPeerConnection`].
    fn close(&self);
}
