//! [MediaStreamTrack][1] abstraction.
//!
//! [1]: https://w3.org/TR/mediacapture-streams/#mediastreamtrack

use medea_media_event_proto::MediaKind;

/// Media track produced by a capture layer or received from a remote peer.
pub trait MediaStreamTrack {
    /// Returns [`id`][1] of the underlying [MediaStreamTrack][2].
    ///
    /// [1]: https://w3.org/TR/mediacapture-streams/#dom-mediastreamtrack-id
    /// [2]: https://w3.org/TR/mediacapture-streams/#mediastreamtrack
    fn id(&self) -> String;

    /// Returns [`MediaKind`] of the underlying [MediaStreamTrack][1].
    ///
    /// [1]: https://w3.org/TR/mediacapture-streams/#mediastreamtrack
    fn kind(&self) -> MediaKind;
}
