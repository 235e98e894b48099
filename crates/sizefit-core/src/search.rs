//! Target-size search.
//!
//! Repeatedly encodes an asset, bisecting the quality range until the output
//! size lands within a tolerance of the target or the iteration budget runs out.
//!
//! # Algorithm
//!
//! Quality starts at the requested value `q0` with the feasible range
//! `[0.1, q0]`. After each probe:
//!
//! - output larger than target: `max = current`, `current = (min + current) / 2`
//! - otherwise: `min = current`, `current = (current + max) / 2`
//!
//! Encoders are only roughly monotonic in quality, so the last probe is not
//! necessarily the best one. The search keeps the probe closest to the target
//! across the whole trajectory, starting from the original file itself. A new
//! probe only replaces it when strictly closer, so among equal distances the
//! earliest wins.
//!
//! # Failures
//!
//! An encode failure aborts the search and discards any partial improvement.
//! Nothing is retried.

use crate::asset::{
    bytes_to_kb, clamp_quality, CompressionRequest, CompressionResult, ImageAsset, MIN_QUALITY,
};
use crate::codec::{select_codec, TargetCodec};
use crate::encode::{EncodeError, Encoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Reasons a search can end without a result.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SearchError {
    /// Target size must be a positive, finite number of kilobytes
    #[error("Invalid target size: {target_kb} KB (must be greater than zero)")]
    InvalidTarget { target_kb: f64 },

    /// An encoder call failed
    #[error("Encoding failed: {0}")]
    EncodeFailure(String),

    /// A remote encoder call exceeded its deadline
    #[error("Encoder transport timed out")]
    TransportTimeout,

    /// The caller cancelled the search
    #[error("Compression cancelled")]
    Cancelled,
}

impl From<EncodeError> for SearchError {
    fn from(err: EncodeError) -> Self {
        match err {
            EncodeError::Timeout => SearchError::TransportTimeout,
            other => SearchError::EncodeFailure(other.to_string()),
        }
    }
}

/// Shared cancellation flag.
///
/// Clones observe the same flag. The search checks it before every probe.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of recording one probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    /// 1-based probe number.
    pub iteration: u32,
    /// Quality the probe was encoded at.
    pub quality: f64,
    /// Encoded size in bytes.
    pub size: usize,
    /// Distance from target in kilobytes.
    pub diff_kb: f64,
    /// Whether this probe became the new best.
    pub improved: bool,
    /// Whether the probe was within tolerance.
    pub converged: bool,
}

#[derive(Debug, Clone)]
struct Candidate {
    buffer: Vec<u8>,
    quality: f64,
}

/// Mutable bookkeeping for one search.
///
/// `min_quality <= current_quality <= max_quality` holds after construction
/// and after every [`SearchState::record`]. `best_diff` never increases.
#[derive(Debug, Clone)]
pub struct SearchState {
    min_quality: f64,
    max_quality: f64,
    current_quality: f64,
    target_kb: f64,
    tolerance: f64,
    // None means the original bytes are still the best
    best: Option<Candidate>,
    best_diff: f64,
    iteration: u32,
}

impl SearchState {
    /// Start a search for a file of `original_len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidTarget`] unless the target is positive and finite.
    pub fn new(original_len: usize, request: &CompressionRequest) -> Result<Self, SearchError> {
        let target_kb = request.target_kb;
        if !target_kb.is_finite() || target_kb <= 0.0 {
            return Err(SearchError::InvalidTarget { target_kb });
        }

        let start = clamp_quality(request.quality);
        Ok(Self {
            min_quality: MIN_QUALITY.min(start),
            max_quality: start,
            current_quality: start,
            target_kb,
            tolerance: request.tolerance,
            best: None,
            best_diff: (bytes_to_kb(original_len) - target_kb).abs(),
            iteration: 0,
        })
    }

    pub fn min_quality(&self) -> f64 {
        self.min_quality
    }

    pub fn max_quality(&self) -> f64 {
        self.max_quality
    }

    /// Quality the next probe should use.
    pub fn current_quality(&self) -> f64 {
        self.current_quality
    }

    /// Distance of the best candidate from the target, in kilobytes.
    pub fn best_diff(&self) -> f64 {
        self.best_diff
    }

    /// Number of probes recorded so far.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn target_kb(&self) -> f64 {
        self.target_kb
    }

    /// Fold a probe encoded at [`SearchState::current_quality`] into the state.
    pub fn record(&mut self, buffer: Vec<u8>) -> Probe {
        self.iteration += 1;

        let quality = self.current_quality;
        let size = buffer.len();
        let size_kb = bytes_to_kb(size);
        let diff_kb = (size_kb - self.target_kb).abs();

        let improved = diff_kb < self.best_diff;
        if improved {
            self.best = Some(Candidate { buffer, quality });
            self.best_diff = diff_kb;
        }

        if size_kb > self.target_kb {
            self.max_quality = self.current_quality;
            self.current_quality = (self.min_quality + self.current_quality) / 2.0;
        } else {
            self.min_quality = self.current_quality;
            self.current_quality = (self.current_quality + self.max_quality) / 2.0;
        }

        Probe {
            iteration: self.iteration,
            quality,
            size,
            diff_kb,
            improved,
            converged: diff_kb / self.target_kb < self.tolerance,
        }
    }

    /// Hand over the best buffer, falling back to `original`.
    fn into_best(self, original: &[u8]) -> (Vec<u8>, Option<f64>) {
        match self.best {
            Some(candidate) => (candidate.buffer, Some(candidate.quality)),
            None => (original.to_vec(), None),
        }
    }
}

/// Progress percentage reported before probe `iteration` (0-based).
pub fn progress_percent(iteration: u32, max_iterations: u32) -> u8 {
    if max_iterations == 0 {
        return 100;
    }
    (iteration as f64 / max_iterations as f64 * 100.0).round() as u8
}

/// Drives an [`Encoder`] through one target-size search.
///
/// A controller is built per search and consumed by [`SearchController::run`].
pub struct SearchController<'a> {
    encoder: &'a dyn Encoder,
    progress: Option<Box<dyn FnMut(u8) + 'a>>,
    cancel: Option<CancelToken>,
    codec: Option<TargetCodec>,
}

impl<'a> SearchController<'a> {
    pub fn new(encoder: &'a dyn Encoder) -> Self {
        Self {
            encoder,
            progress: None,
            cancel: None,
            codec: None,
        }
    }

    /// Receive a percentage before each probe and 100 on success.
    pub fn with_progress(mut self, progress: impl FnMut(u8) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Abort with [`SearchError::Cancelled`] once `token` is cancelled.
    ///
    /// The token is checked before each probe. An encode call already in
    /// flight runs to completion (or to the remote timeout) first.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Force an output codec instead of selecting one from the media type.
    pub fn with_codec(mut self, codec: TargetCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    fn report(&mut self, percent: u8) {
        if let Some(progress) = self.progress.as_mut() {
            progress(percent);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Run the search to completion.
    ///
    /// # Errors
    ///
    /// - [`SearchError::InvalidTarget`] before any encoder call if the target is not positive
    /// - [`SearchError::EncodeFailure`] / [`SearchError::TransportTimeout`] on the first failed call
    /// - [`SearchError::Cancelled`] if the token was cancelled before a probe
    pub fn run(
        mut self,
        asset: &ImageAsset,
        request: &CompressionRequest,
    ) -> Result<CompressionResult, SearchError> {
        let codec = self
            .codec
            .unwrap_or_else(|| select_codec(asset.media_type()));
        let mut state = SearchState::new(asset.len(), request)?;
        let max_iterations = request.max_iterations;

        for i in 0..max_iterations {
            if self.is_cancelled() {
                tracing::warn!(iteration = i, "search cancelled");
                return Err(SearchError::Cancelled);
            }

            self.report(progress_percent(i, max_iterations));

            let quality = state.current_quality();
            let buffer = match self.encoder.encode(asset, codec, quality) {
                Ok(buffer) => buffer,
                Err(err) => {
                    tracing::warn!(iteration = i, quality, error = %err, "encode failed, aborting search");
                    return Err(err.into());
                }
            };

            let probe = state.record(buffer);
            tracing::debug!(
                iteration = probe.iteration,
                quality = probe.quality,
                size = probe.size,
                diff_kb = probe.diff_kb,
                improved = probe.improved,
                "probe"
            );

            if probe.converged {
                break;
            }
        }

        self.report(100);

        let iterations = state.iteration();
        let best_diff = state.best_diff();
        let (buffer, quality) = state.into_best(asset.bytes());
        tracing::info!(
            %codec,
            iterations,
            original = asset.len(),
            size = buffer.len(),
            target_kb = request.target_kb,
            best_diff,
            "search finished"
        );

        Ok(CompressionResult::new(
            buffer,
            codec.output_mime(asset.media_type()),
            quality,
            iterations,
        ))
    }
}

/// Compress `asset` toward `target_kb` starting from `quality`.
///
/// Uses the default budget of 8 probes and 5% tolerance.
///
/// # Errors
///
/// See [`SearchController::run`].
pub fn compress_to_target(
    asset: &ImageAsset,
    quality: f64,
    target_kb: f64,
    encoder: &dyn Encoder,
) -> Result<CompressionResult, SearchError> {
    SearchController::new(encoder).run(asset, &CompressionRequest::new(quality, target_kb))
}


// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod proptests {
    use super::tests::LinearEncoder;
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: quality bounds stay ordered and best_diff never grows.
        #[test]
        fn prop_state_invariants(
            original_kb in 1usize..2000,
            quality in 0.0f64..=1.0,
            target_kb in 1.0f64..2000.0,
            sizes in prop::collection::vec(0usize..4_000_000, 1..16),
        ) {
            let request = CompressionRequest::new(quality, target_kb);
            let mut state = SearchState::new(original_kb * 1024, &request).unwrap();

            prop_assert!(state.min_quality() <= state.current_quality());
            prop_assert!(state.current_quality() <= state.max_quality());

            let mut last_diff = state.best_diff();
            for size in sizes {
                let probe = state.record(vec![0; size]);

                prop_assert!(state.min_quality() <= state.current_quality());
                prop_assert!(state.current_quality() <= state.max_quality());
                prop_assert!(state.best_diff() <= last_diff);
                prop_assert!(MIN_QUALITY <= probe.quality && probe.quality <= request.quality);
                if probe.improved {
                    prop_assert_eq!(state.best_diff(), probe.diff_kb);
                }
                last_diff = state.best_diff();
            }
        }

        /// Property: with a monotonic encoder the search either converges or uses its budget.
        #[test]
        fn prop_monotonic_encoder_converges_or_exhausts(
            original_kb in 50usize..1000,
            quality in 0.2f64..=1.0,
            ratio in 0.05f64..1.0,
        ) {
            let asset = ImageAsset::new(vec![0; original_kb * 1024], "image/jpeg");
            let target_kb = original_kb as f64 * ratio;
            let request = CompressionRequest::new(quality, target_kb);

            let result = SearchController::new(&LinearEncoder).run(&asset, &request).unwrap();

            let diff = (result.size_kb() - target_kb).abs();
            let original_diff = (asset.size_kb() - target_kb).abs();
            prop_assert!(diff <= original_diff);
            prop_assert!(
                diff / target_kb < request.tolerance || result.iterations() == request.max_iterations,
                "diff={} iterations={}", diff, result.iterations()
            );
        }

        /// Property: same inputs, same result.
        #[test]
        fn prop_deterministic(
            original_kb in 1usize..200,
            quality in 0.0f64..=1.0,
            target_kb in 0.5f64..300.0,
        ) {
            let asset = ImageAsset::new(vec![1; original_kb * 1024], "image/png");
            let a = compress_to_target(&asset, quality, target_kb, &LinearEncoder).unwrap();
            let b = compress_to_target(&asset, quality, target_kb, &LinearEncoder).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
