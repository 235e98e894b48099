//! Encoder capability and its implementations.
//!
//! The search controller only ever sees the [`Encoder`] trait: one black-box
//! call per iteration that turns the original file into a buffer at a given
//! quality. Two implementations exist:
//!
//! - [`LocalEncoder`] - in-process, built on the `image` and `webp` crates
//! - `RemoteEncoder` (feature `remote`) - forwards each probe to a worker over HTTP
//!
//! # Examples
//!
//! ```ignore
//! use sizefit_core::encode::{Encoder, LocalEncoder};
//! use sizefit_core::{ImageAsset, TargetCodec};
//!
//! let asset = ImageAsset::new(std::fs::read("photo.jpg").unwrap(), "image/jpeg");
//! let bytes = LocalEncoder::new().encode(&asset, TargetCodec::Jpeg, 0.8).unwrap();
//! println!("Encoded {} bytes", bytes.len());
//! ```

pub(crate) mod local;
#[cfg(feature = "remote")]
mod remote;

pub use local::LocalEncoder;
#[cfg(feature = "remote")]
pub use remote::{RemoteConfig, RemoteEncoder};

use crate::asset::ImageAsset;
use crate::codec::TargetCodec;
use thiserror::Error;

/// Errors that can occur while producing a single candidate buffer.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Input bytes could not be decoded as an image
    #[error("Failed to decode input image: {0}")]
    Decode(String),

    /// The codec rejected the image
    #[error("{codec} encoding failed: {message}")]
    Encode { codec: TargetCodec, message: String },

    /// The request never completed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The per-call deadline elapsed
    #[error("Encoder call timed out")]
    Timeout,

    /// The worker answered with an error of its own
    #[error("Remote encoder error: {0}")]
    Remote(String),

    /// The worker answered with something we could not interpret
    #[error("Malformed encoder response: {0}")]
    Protocol(String),
}

/// Anything that can turn an asset into a compressed buffer at a given quality.
///
/// Implementations must be a pure function of their inputs and must not keep
/// references to the asset after returning. The caller clamps `quality` to
/// `[0.1, 1.0]` before every call.
pub trait Encoder: Send + Sync {
    /// Encode `asset` with `codec` at `quality`.
    fn encode(
        &self,
        asset: &ImageAsset,
        codec: TargetCodec,
        quality: f64,
    ) -> Result<Vec<u8>, EncodeError>;
}

impl<E: Encoder + ?Sized> Encoder for &E {
    fn encode(
        &self,
        asset: &ImageAsset,
        codec: TargetCodec,
        quality: f64,
    ) -> Result<Vec<u8>, EncodeError> {
        (**self).encode(asset, codec, quality)
    }
}

impl<E: Encoder + ?Sized> Encoder for Box<E> {
    fn encode(
        &self,
        asset: &ImageAsset,
        codec: TargetCodec,
        quality: f64,
    ) -> Result<Vec<u8>, EncodeError> {
        (**self).encode(asset, codec, quality)
    }
}
