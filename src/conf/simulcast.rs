//! Simulcast settings of published video.

use medea_media_event_proto::Encoding;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Simulcast settings of published video tracks.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, SmartDefault)]
#[serde(default)]
pub struct Simulcast {
    /// [`Encoding`]s negotiated for every simulcast video track, from the
    /// lowest resolution to the highest one.
    ///
    /// Defaults to `["l", "m", "h"]`.
    #[default(_code = "vec![Encoding::Low, Encoding::Medium, Encoding::High]")]
    pub encodings: Vec<Encoding>,
}

impl Simulcast {
    /// Indicates whether the provided [`Encoding`] is negotiated for
    /// simulcast tracks.
    #[inline]
    #[must_use]
    pub fn supports(&self, encoding: Encoding) -> bool {
        self.encodings.contains(&encoding)
    }

    /// Returns factor to scale the resolution of the provided [`Encoding`]
    /// down by.
    #[must_use]
    pub fn scale_resolution_down_by(encoding: Encoding) -> f64 {
        match encoding {
            Encoding::Low => 4.0,
            Encoding::Medium => 2.0,
            Encoding::High => 1.0,
        }
    }
}

#[cfg(test)]
mod spec {
    use medea_media_event_proto::Encoding;

    use super::Simulcast;

    #[test]
    fn supports_all_encodings_by_default() {
        let conf = Simulcast::default();

        assert!(conf.supports(Encoding::Low));
        assert!(conf.supports(Encoding::Medium));
        assert!(conf.supports(Encoding::High));
    }

    #[test]
    fn scales_lower_encodings_down() {
        assert!(
            Simulcast::scale_resolution_down_by(Encoding::Low)
                > Simulcast::scale_resolution_down_by(Encoding::Medium)
        );
        assert!(
            (Simulcast::scale_resolution_down_by(Encoding::High) - 1.0).abs()
                < f64::EPSILON
        );
    }
}
