//! Request and result types for a compression run.

use serde::{Deserialize, Serialize};

/// Lowest quality any probe may use.
pub const MIN_QUALITY: f64 = 0.1;

/// Highest quality any probe may use.
pub const MAX_QUALITY: f64 = 1.0;

/// Default iteration budget for one search.
pub const DEFAULT_MAX_ITERATIONS: u32 = 8;

/// Default convergence tolerance, as a fraction of the target.
pub const DEFAULT_TOLERANCE: f64 = 0.05;

/// Bytes per kilobyte for all target-size arithmetic.
pub const BYTES_PER_KB: f64 = 1024.0;

/// Convert a byte count to kilobytes.
#[inline]
pub fn bytes_to_kb(bytes: usize) -> f64 {
    bytes as f64 / BYTES_PER_KB
}

/// Clamp a quality value into `[MIN_QUALITY, MAX_QUALITY]`.
///
/// NaN collapses to the minimum.
#[inline]
pub fn clamp_quality(quality: f64) -> f64 {
    if quality.is_nan() {
        return MIN_QUALITY;
    }
    quality.clamp(MIN_QUALITY, MAX_QUALITY)
}

/// An uploaded image: raw file bytes plus the media type it was declared with.
///
/// Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    media_type: String,
}

impl ImageAsset {
    /// Wrap file bytes and their declared media type.
    pub fn new(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            bytes,
            media_type: media_type.into(),
        }
    }

    /// Raw file bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Declared media type, e.g. `image/png`.
    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the asset holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Size in kilobytes.
    pub fn size_kb(&self) -> f64 {
        bytes_to_kb(self.bytes.len())
    }
}

/// Caller parameters for one search.
///
/// Deserializes from partial objects; the iteration budget and tolerance
/// fall back to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionRequest {
    /// Starting (and maximum) quality, clamped to `[0.1, 1.0]`.
    pub quality: f64,
    /// Desired output size in kilobytes. Must be positive.
    pub target_kb: f64,
    /// Maximum number of encoder calls.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Stop once `|size - target| / target` drops below this.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

impl CompressionRequest {
    /// Create a request from a quality hint and an explicit target size.
    ///
    /// The quality is clamped; the target is validated by the search.
    pub fn new(quality: f64, target_kb: f64) -> Self {
        Self {
            quality: clamp_quality(quality),
            target_kb,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Override the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the convergence tolerance.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Create a request whose target is `asset size × quality`.
    ///
    /// This is how the upload page derives the target from its single slider.
    pub fn from_ratio(asset: &ImageAsset, quality: f64) -> Self {
        let target_kb = target_size_kb(asset.len(), quality);
        Self::new(quality, target_kb)
    }
}

/// Target size in kilobytes for a file of `original_len` bytes scaled by `quality`.
pub fn target_size_kb(original_len: usize, quality: f64) -> f64 {
    bytes_to_kb(original_len) * quality
}

/// The output of a finished search.
///
/// Replaces (never merges with) any earlier result for the same asset.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    buffer: Vec<u8>,
    mime: String,
    quality: Option<f64>,
    iterations: u32,
}

impl CompressionResult {
    pub(crate) fn new(buffer: Vec<u8>, mime: String, quality: Option<f64>, iterations: u32) -> Self {
        Self {
            buffer,
            mime,
            quality,
            iterations,
        }
    }

    /// The compressed bytes (may be the original bytes if nothing was closer).
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Take ownership of the compressed bytes.
    pub fn into_buffer(self) -> Vec<u8> {
        self.buffer
    }

    /// Size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Size of the buffer in kilobytes.
    pub fn size_kb(&self) -> f64 {
        bytes_to_kb(self.buffer.len())
    }

    /// Media type of the buffer.
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Quality that produced the buffer, or `None` if the original was kept.
    pub fn quality(&self) -> Option<f64> {
        self.quality
    }

    /// Number of encoder calls made during the search.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}
