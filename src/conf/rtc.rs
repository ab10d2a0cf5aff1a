//! Peer connection settings.

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Settings of the created peer connections.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Rtc {
    /// [ICE] servers used in addition to the ones provided by the media
    /// server.
    ///
    /// Defaults to an empty list.
    ///
    /// [ICE]: https://webrtcglossary.com/ice
    pub ice_servers: Vec<IceServer>,

    /// Candidates the ICE agent is allowed to use.
    ///
    /// Defaults to [`IceTransportPolicy::All`].
    pub ice_transport_policy: IceTransportPolicy,
}

/// [STUN]/[TURN] server description.
///
/// [STUN]: https://webrtcglossary.com/stun
/// [TURN]: https://webrtcglossary.com/turn
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IceServer {
    /// URLs of the server.
    pub urls: Vec<String>,

    /// Username to authorize on a [TURN] server with.
    ///
    /// [TURN]: https://webrtcglossary.com/turn
    #[serde(default)]
    pub username: Option<String>,

    /// Credential to authorize on a [TURN] server with.
    ///
    /// [TURN]: https://webrtcglossary.com/turn
    #[serde(default)]
    pub credential: Option<String>,
}

/// [RTCIceTransportPolicy][1] of a peer connection.
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcicetransportpolicy
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault,
)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// Any type of candidates may be used.
    #[default]
    All,

    /// Only relayed (TURN) candidates may be used.
    Relay,
}
