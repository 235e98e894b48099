//! Output codec selection.
//!
//! The output format is chosen once per request from the input's declared
//! media type and stays fixed for the whole search.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output compression format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetCodec {
    /// Baseline JPEG.
    Jpeg,
    /// Lossy WebP.
    Webp,
    /// Lossless PNG; quality maps to a compression level.
    Png,
    /// Input is returned untouched.
    Passthrough,
}

impl TargetCodec {
    /// Media type of buffers produced with this codec.
    ///
    /// `Passthrough` has no media type of its own; callers fall back to the
    /// asset's declared type (see [`TargetCodec::output_mime`]).
    pub fn mime(self) -> Option<&'static str> {
        match self {
            TargetCodec::Jpeg => Some("image/jpeg"),
            TargetCodec::Webp => Some("image/webp"),
            TargetCodec::Png => Some("image/png"),
            TargetCodec::Passthrough => None,
        }
    }

    /// Media type of the output for an input declared as `input_mime`.
    pub fn output_mime(self, input_mime: &str) -> String {
        self.mime().unwrap_or(input_mime).to_string()
    }

    /// Short lowercase name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            TargetCodec::Jpeg => "jpeg",
            TargetCodec::Webp => "webp",
            TargetCodec::Png => "png",
            TargetCodec::Passthrough => "passthrough",
        }
    }

    /// zlib-style PNG compression level (0-9) for a quality in `[0, 1]`.
    ///
    /// Higher quality means less compression effort: `round(9 - q * 8.9)`.
    pub fn png_level(quality: f64) -> u8 {
        let q = quality.clamp(0.0, 1.0);
        (9.0 - q * 8.9).round().clamp(0.0, 9.0) as u8
    }
}

impl fmt::Display for TargetCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(TargetCodec::Jpeg),
            "webp" => Ok(TargetCodec::Webp),
            "png" => Ok(TargetCodec::Png),
            "passthrough" => Ok(TargetCodec::Passthrough),
            other => Err(format!("Unknown codec: {other}")),
        }
    }
}

/// Pick the output codec for an input media type.
///
/// | input        | output      |
/// |--------------|-------------|
/// | `image/png`  | WebP        |
/// | `image/webp` | WebP        |
/// | `image/jpeg` | JPEG        |
/// | other        | passthrough |
///
/// Never fails; unknown types are passed through unchanged. Media type
/// parameters (`; charset=...`) and letter case are ignored.
pub fn select_codec(media_type: &str) -> TargetCodec {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/png" | "image/webp" => TargetCodec::Webp,
        "image/jpeg" => TargetCodec::Jpeg,
        _ => TargetCodec::Passthrough,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_codec_table() {
        assert_eq!(select_codec("image/png"), TargetCodec::Webp);
        assert_eq!(select_codec("image/webp"), TargetCodec::Webp);
        assert_eq!(select_codec("image/jpeg"), TargetCodec::Jpeg);
    }

    #[test]
    fn test_select_codec_unknown_passes_through() {
        assert_eq!(select_codec("image/gif"), TargetCodec::Passthrough);
        assert_eq!(select_codec("application/pdf"), TargetCodec::Passthrough);
        assert_eq!(select_codec(""), TargetCodec::Passthrough);
        // Non-standard alias is not recognized
        assert_eq!(select_codec("image/jpg"), TargetCodec::Passthrough);
    }

    #[test]
    fn test_select_codec_ignores_case_and_params() {
        assert_eq!(select_codec("IMAGE/PNG"), TargetCodec::Webp);
        assert_eq!(select_codec("image/jpeg; q=0.9"), TargetCodec::Jpeg);
    }

    #[test]
    fn test_output_mime() {
        assert_eq!(TargetCodec::Webp.output_mime("image/png"), "image/webp");
        assert_eq!(TargetCodec::Jpeg.output_mime("image/jpeg"), "image/jpeg");
        assert_eq!(TargetCodec::Passthrough.output_mime("image/gif"), "image/gif");
    }

    #[test]
    fn test_png_level_mapping() {
        assert_eq!(TargetCodec::png_level(1.0), 0);
        assert_eq!(TargetCodec::png_level(0.0), 9);
        assert_eq!(TargetCodec::png_level(0.5), 5);
        assert_eq!(TargetCodec::png_level(0.1), 8);
        // Out of range values are clamped
        assert_eq!(TargetCodec::png_level(7.0), 0);
    }

    #[test]
    fn test_codec_from_str_round_trip() {
        for codec in [
            TargetCodec::Jpeg,
            TargetCodec::Webp,
            TargetCodec::Png,
            TargetCodec::Passthrough,
        ] {
            assert_eq!(codec.to_string().parse::<TargetCodec>().unwrap(), codec);
        }
        assert!("tiff".parse::<TargetCodec>().is_err());
    }
}
