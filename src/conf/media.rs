//! Published media settings.

use medea_media_event_proto::MediaKind;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Kinds of media the local endpoint is allowed to publish.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Media {
    /// Whether audio tracks may be published.
    ///
    /// Defaults to `true`.
    #[default(true)]
    pub allow_audio: bool,

    /// Whether video tracks may be published.
    ///
    /// Defaults to `true`.
    #[default(true)]
    pub allow_video: bool,
}

impl Media {
    /// Indicates whether tracks of the provided [`MediaKind`] may be
    /// published.
    #[inline]
    #[must_use]
    pub fn allows(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Audio => self.allow_audio,
            MediaKind::Video => self.allow_video,
        }
    }
}
