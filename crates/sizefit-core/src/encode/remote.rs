//! Network-backed encoder.
//!
//! Each probe is a blocking multipart POST to the worker's encode endpoint,
//! answered with a [`CompressResponse`]. Every call is bounded by a timeout so
//! a stalled worker cannot hang the search.

use super::{EncodeError, Encoder};
use crate::asset::ImageAsset;
use crate::codec::TargetCodec;
use crate::protocol::{CompressResponse, FIELD_CODEC, FIELD_FILE, FIELD_QUALITY};
use reqwest::blocking::{multipart, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Where and how to reach the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Full URL of the encode endpoint.
    pub endpoint: String,
    /// Per-call deadline in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RemoteConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Set the per-call deadline, rounded up to whole seconds (at least one).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = (timeout.as_secs_f64().ceil() as u64).max(1);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Encoder that forwards every probe to a remote worker.
#[derive(Debug, Clone)]
pub struct RemoteEncoder {
    client: Client,
    endpoint: String,
}

impl RemoteEncoder {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &RemoteConfig) -> Result<Self, EncodeError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EncodeError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn transport_error(err: reqwest::Error) -> EncodeError {
    if err.is_timeout() {
        EncodeError::Timeout
    } else {
        EncodeError::Transport(err.to_string())
    }
}

/// Interpret a worker reply body.
fn parse_reply(body: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let response: CompressResponse =
        serde_json::from_slice(body).map_err(|e| EncodeError::Protocol(e.to_string()))?;
    Ok(response.decode()?)
}

impl Encoder for RemoteEncoder {
    fn encode(
        &self,
        asset: &ImageAsset,
        codec: TargetCodec,
        quality: f64,
    ) -> Result<Vec<u8>, EncodeError> {
        let file = multipart::Part::bytes(asset.bytes().to_vec())
            .file_name("upload")
            .mime_str(asset.media_type())
            .map_err(|e| EncodeError::Transport(e.to_string()))?;

        let form = multipart::Form::new()
            .part(FIELD_FILE, file)
            .text(FIELD_CODEC, codec.as_str())
            .text(FIELD_QUALITY, quality.to_string());

        tracing::debug!(endpoint = %self.endpoint, %codec, quality, "remote encode");

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().map_err(transport_error)?;

        // Workers report failures in the body, even alongside an error status
        match parse_reply(&body) {
            Ok(bytes) => Ok(bytes),
            Err(EncodeError::Protocol(_)) if !status.is_success() => {
                Err(EncodeError::Transport(format!("HTTP {status}")))
            }
            Err(err) => Err(err),
        }
    }
}
