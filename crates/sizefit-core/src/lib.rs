//! Sizefit Core - target-size image compression
//!
//! This crate finds an encoder quality whose output lands close to a requested
//! byte size. The search loop is the same whether the encoder runs in-process
//! or on a remote worker; only the [`Encoder`] implementation changes.
//!
//! # Module Structure
//!
//! - `asset` - Image, request and result types
//! - `codec` - Output codec selection from the input media type
//! - `encode` - The [`Encoder`] capability plus local and remote implementations
//! - `search` - The bisection controller that tracks the best candidate
//! - `batch` - Concurrent searches over many images (feature `parallel`)
//! - `session` - Per-item progress and result bookkeeping
//! - `protocol` - JSON wire format and handlers for the remote worker
//!
//! # Usage
//!
//! ```ignore
//! use sizefit_core::{compress_to_target, ImageAsset, LocalEncoder};
//!
//! let asset = ImageAsset::new(std::fs::read("photo.png").unwrap(), "image/png");
//! let result = compress_to_target(&asset, 0.7, 200.0, &LocalEncoder::new()).unwrap();
//! println!("{} bytes as {}", result.size(), result.mime());
//! ```

pub mod asset;
#[cfg(feature = "parallel")]
pub mod batch;
pub mod codec;
pub mod encode;
pub mod protocol;
pub mod search;
pub mod session;

pub use asset::{
    target_size_kb, CompressionRequest, CompressionResult, ImageAsset, DEFAULT_MAX_ITERATIONS,
    DEFAULT_TOLERANCE,
};
#[cfg(feature = "parallel")]
pub use batch::{compress_batch, BatchError};
pub use codec::{select_codec, TargetCodec};
pub use encode::{EncodeError, Encoder, LocalEncoder};
#[cfg(feature = "remote")]
pub use encode::{RemoteConfig, RemoteEncoder};
pub use search::{compress_to_target, CancelToken, SearchController, SearchError, SearchState};
pub use session::{EncoderVariant, ItemId, Session, SessionError};
