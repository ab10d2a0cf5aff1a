//! [RTCRtpTransceiver][1] abstraction.
//!
//! [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiver

use std::rc::Rc;

use async_trait::async_trait;
use medea_media_event_proto::{Encoding, MediaKind};

use crate::platform::{peer_connection::Result, MediaStreamTrack};

/// Representation of [RTCRtpTransceiverDirection][1].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiverdirection
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransceiverDirection {
    /// [`sendrecv` direction][1].
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiverdirection-sendrecv
    SendRecv,

    /// [`sendonly` direction][1].
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiverdirection-sendonly
    SendOnly,

    /// [`recvonly` direction][1].
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiverdirection-recvonly
    RecvOnly,

    /// [`inactive` direction][1].
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiverdirection-inactive
    Inactive,
}

impl TransceiverDirection {
    /// Indicates whether media is received in this direction.
    #[inline]
    #[must_use]
    pub fn is_recv(self) -> bool {
        matches!(self, Self::SendRecv | Self::RecvOnly)
    }
}

/// [RTCRtpEncodingParameters][1] of a sending [`Transceiver`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcrtpencodingparameters
#[derive(Clone, Debug, PartialEq)]
pub struct SendEncodingParameters {
    /// RID of the encoding, [`None`] if simulcast is not used.
    pub rid: Option<Encoding>,

    /// Indicator whether the encoding is being sent.
    pub active: bool,

    /// Maximal bitrate of the encoding in bps, [`None`] if unlimited.
    pub max_bitrate: Option<u64>,

    /// Factor to scale the resolution of the encoding down by.
    pub scale_resolution_down_by: f64,
}

/// [RTCRtpTransceiverInit][1] used to create a [`Transceiver`].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiverinit
#[derive(Clone)]
pub struct TransceiverInit {
    /// Kind of media transferred by the [`Transceiver`].
    pub kind: MediaKind,

    /// Initial direction of the [`Transceiver`].
    pub direction: TransceiverDirection,

    /// Track to send, if any.
    pub track: Option<Rc<dyn MediaStreamTrack>>,

    /// Encodings to send, empty for receive-only [`Transceiver`]s.
    pub send_encodings: Vec<SendEncodingParameters>,
}

impl TransceiverInit {
    /// Creates a [`TransceiverInit`] of a receive-only [`Transceiver`].
    #[must_use]
    pub fn recv_only(kind: MediaKind) -> Self {
        Self {
            kind,
            direction: TransceiverDirection::RecvOnly,
            track: None,
            send_encodings: Vec::new(),
        }
    }
}

/// Wrapper around [RTCRtpTransceiver][1].
///
/// [1]: https://w3.org/TR/webrtc/#dom-rtcrtptransceiver
#[async_trait(?Send)]
pub trait Transceiver {
    /// Returns [`mid`][1] of this [`Transceiver`], [`None`] until it is
    /// negotiated.
    ///
    /// [1]: https://w3.org/TR/webrtc/#dom-rtptransceiver-mid
    fn mid(&self) -> Option<String>;

    /// Returns kind of media transferred by this [`Transceiver`].
    fn kind(&self) -> MediaKind;

    /// Returns current [`TransceiverDirection`].
    fn direction(&self) -> TransceiverDirection;

    /// Replaces the source of this [`Transceiver`]'s sender without
    /// renegotiation.
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::ReplaceTrack`] if [replaceTrack()][1]
    /// fails.
    ///
    /// [`RtcPeerConnectionError::ReplaceTrack`]:
    /// crate::platform::RtcPeerConnectionError::ReplaceTrack
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcrtpsender-replacetrack
    async fn replace_track(
        &self,
        track: Option<Rc<dyn MediaStreamTrack>>,
    ) -> Result<()>;

    /// Starts or stops sending the provided [`Encoding`].
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::SetParameters`] if
    /// [setParameters()][1] fails.
    ///
    /// [`RtcPeerConnectionError::SetParameters`]:
    /// crate::platform::RtcPeerConnectionError::SetParameters
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcrtpsender-setparameters
    async fn set_encoding_active(
        &self,
        encoding: Encoding,
        active: bool,
    ) -> Result<()>;

    /// Limits bitrate of the provided [`Encoding`], or of the only sent
    /// encoding if [`None`] is provided. Zero `bitrate` removes the limit.
    ///
    /// # Errors
    ///
    /// With [`RtcPeerConnectionError::SetParameters`] if
    /// [setParameters()][1] fails.
    ///
    /// [`RtcPeerConnectionError::SetParameters`]:
    /// crate::platform::RtcPeerConnectionError::SetParameters
    /// [1]: https://w3.org/TR/webrtc/#dom-rtcrtpsender-setparameters
    async fn set_max_bitrate(
        &self,
        encoding: Option<Encoding>,
        bitrate: u64,
    ) -> Result<()>;
}

/// Converts the provided bitrate in kbps to bps.
#[inline]
#[must_use]
pub fn kbps_to_bps(kbps: u32) -> u64 {
    u64::from(kbps) * 1000
}
