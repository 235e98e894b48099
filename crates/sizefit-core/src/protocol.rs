//! Wire format shared with the remote compression worker.
//!
//! Requests are multipart forms (the file plus a few text fields); responses
//! are JSON objects carrying the output as base64:
//!
//! ```json
//! { "buffer": "<base64>", "size": 12345, "mime": "image/webp" }
//! ```
//!
//! A failed request answers with an empty buffer, zero size and an `error`
//! message. The handlers here are framework-agnostic: an HTTP layer extracts
//! the fields and serializes the returned [`CompressResponse`].

use crate::asset::{clamp_quality, CompressionRequest, ImageAsset};
use crate::codec::{select_codec, TargetCodec};
use crate::encode::{EncodeError, Encoder};
use crate::search::SearchController;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Multipart field carrying the image.
pub const FIELD_FILE: &str = "file";
/// Multipart field carrying the quality (0-1).
pub const FIELD_QUALITY: &str = "quality";
/// Multipart field carrying the target size in KB.
pub const FIELD_TARGET_KB: &str = "targetSizeKB";
/// Multipart field carrying the output codec of a single probe.
pub const FIELD_CODEC: &str = "codec";

/// Quality used when the request carries none (or an unusable one).
pub const DEFAULT_QUALITY: f64 = 0.7;
/// Target used when the request carries none (or an unusable one).
pub const DEFAULT_TARGET_KB: f64 = 500.0;

/// Error message for requests without a file.
pub const NO_FILE_ERROR: &str = "No file uploaded";

/// Errors found while interpreting a worker response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The worker reported a failure
    #[error("{0}")]
    Remote(String),

    /// `buffer` is not valid base64
    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    /// `size` disagrees with the decoded buffer
    #[error("Declared size {declared} does not match payload size {actual}")]
    SizeMismatch { declared: usize, actual: usize },
}

impl From<ProtocolError> for EncodeError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Remote(message) => EncodeError::Remote(message),
            other => EncodeError::Protocol(other.to_string()),
        }
    }
}

/// JSON body returned by the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressResponse {
    /// Output bytes, base64 (standard alphabet, padded).
    pub buffer: String,
    /// Output length in bytes.
    pub size: usize,
    /// Output media type.
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompressResponse {
    /// Successful response for `bytes`.
    pub fn success(bytes: &[u8], mime: impl Into<String>) -> Self {
        Self {
            buffer: STANDARD.encode(bytes),
            size: bytes.len(),
            mime: mime.into(),
            error: None,
        }
    }

    /// Failed response carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            buffer: String::new(),
            size: 0,
            mime: String::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Decode and validate the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker reported one, the payload is not base64,
    /// or the declared size is wrong.
    pub fn decode(&self) -> Result<Vec<u8>, ProtocolError> {
        if let Some(message) = &self.error {
            return Err(ProtocolError::Remote(message.clone()));
        }

        let bytes = STANDARD
            .decode(&self.buffer)
            .map_err(|e| ProtocolError::Base64(e.to_string()))?;

        if bytes.len() != self.size {
            return Err(ProtocolError::SizeMismatch {
                declared: self.size,
                actual: bytes.len(),
            });
        }

        Ok(bytes)
    }
}

/// Parse a numeric text field, falling back to `default` when it is missing,
/// unparsable, zero or NaN.
///
/// Negative values are kept so the search can reject them.
fn parse_number(raw: Option<&str>, default: f64) -> f64 {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| *v != 0.0 && !v.is_nan())
        .unwrap_or(default)
}

/// Read the `quality` field.
pub fn parse_quality(raw: Option<&str>) -> f64 {
    parse_number(raw, DEFAULT_QUALITY)
}

/// Read the `targetSizeKB` field.
pub fn parse_target_kb(raw: Option<&str>) -> f64 {
    parse_number(raw, DEFAULT_TARGET_KB)
}

/// Handle a full compression request on the worker.
///
/// Runs the whole target-size search next to the encoder and answers with
/// the best buffer found.
pub fn serve_compress(
    file: Option<&ImageAsset>,
    quality: Option<&str>,
    target_kb: Option<&str>,
    encoder: &dyn Encoder,
) -> CompressResponse {
    let Some(asset) = file.filter(|f| !f.is_empty()) else {
        return CompressResponse::failure(NO_FILE_ERROR);
    };

    let request = CompressionRequest::new(parse_quality(quality), parse_target_kb(target_kb));
    match SearchController::new(encoder).run(asset, &request) {
        Ok(result) => CompressResponse::success(result.buffer(), result.mime()),
        Err(err) => {
            tracing::warn!(error = %err, "compress request failed");
            CompressResponse::failure(err.to_string())
        }
    }
}

/// Handle a single encode probe on the worker.
///
/// `codec` defaults to the one selected for the file's media type.
pub fn serve_encode(
    file: Option<&ImageAsset>,
    codec: Option<&str>,
    quality: Option<&str>,
    encoder: &dyn Encoder,
) -> CompressResponse {
    let Some(asset) = file.filter(|f| !f.is_empty()) else {
        return CompressResponse::failure(NO_FILE_ERROR);
    };

    let codec = match codec {
        Some(raw) => match raw.parse::<TargetCodec>() {
            Ok(codec) => codec,
            Err(message) => return CompressResponse::failure(message),
        },
        None => select_codec(asset.media_type()),
    };

    match encoder.encode(asset, codec, clamp_quality(parse_quality(quality))) {
        Ok(bytes) => CompressResponse::success(&bytes, codec.output_mime(asset.media_type())),
        Err(err) => {
            tracing::warn!(%codec, error = %err, "encode request failed");
            CompressResponse::failure(err.to_string())
        }
    }
}
