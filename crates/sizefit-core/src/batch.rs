//! Concurrent searches over many images.
//!
//! Every job is an independent search with its own [`SearchState`]; jobs
//! share nothing but the encoder, which is `Sync`. Concurrency is bounded by a
//! dedicated rayon pool so a large batch cannot take over the global pool.
//!
//! [`SearchState`]: crate::search::SearchState

use crate::asset::{CompressionRequest, CompressionResult, ImageAsset};
use crate::encode::Encoder;
use crate::search::{SearchController, SearchError};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use thiserror::Error;

/// Errors that prevent a batch from starting.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The worker pool could not be created
    #[error("Failed to start worker pool: {0}")]
    Pool(String),
}

/// Build a job list where each target is `asset size × quality`.
pub fn ratio_jobs(assets: &[ImageAsset], quality: f64) -> Vec<(&ImageAsset, CompressionRequest)> {
    assets
        .iter()
        .map(|asset| (asset, CompressionRequest::from_ratio(asset, quality)))
        .collect()
}

/// Run one search per job with at most `concurrency` running at once.
///
/// A `concurrency` of 0 uses one thread per core. Results come back in job
/// order; a failed search only affects its own slot.
///
/// # Errors
///
/// Returns [`BatchError::Pool`] if the thread pool cannot be built.
pub fn compress_batch(
    jobs: &[(&ImageAsset, CompressionRequest)],
    encoder: &dyn Encoder,
    concurrency: usize,
) -> Result<Vec<Result<CompressionResult, SearchError>>, BatchError> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(concurrency)
        .thread_name(|i| format!("sizefit-search-{i}"))
        .build()
        .map_err(|e| BatchError::Pool(e.to_string()))?;

    tracing::info!(jobs = jobs.len(), threads = pool.current_num_threads(), "starting batch");

    Ok(pool.install(|| {
        jobs.par_iter()
            .map(|(asset, request)| SearchController::new(encoder).run(asset, request))
            .collect()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TargetCodec;
    use crate::encode::EncodeError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Linear encoder that logs each asset's quality trajectory by asset size.
    #[derive(Default)]
    struct RecordingEncoder {
        trajectories: Mutex<HashMap<usize, Vec<f64>>>,
    }

    impl Encoder for RecordingEncoder {
        fn encode(
            &self,
            asset: &ImageAsset,
            _codec: TargetCodec,
            quality: f64,
        ) -> Result<Vec<u8>, EncodeError> {
            self.trajectories
                .lock()
                .unwrap()
                .entry(asset.len())
                .or_default()
                .push(quality);
            // Slightly non-linear so trajectories differ between assets
            let size = (asset.len() as f64 * quality * quality.sqrt()) as usize;
            Ok(vec![0; size])
        }
    }

    fn assets() -> Vec<ImageAsset> {
        (1..=5)
            .map(|i| ImageAsset::new(vec![i as u8; i * 40_000 + 123], "image/jpeg"))
            .collect()
    }

    #[test]
    fn test_batch_matches_sequential_runs() {
        let assets = assets();
        let jobs = ratio_jobs(&assets, 0.6);

        let concurrent = RecordingEncoder::default();
        let results = compress_batch(&jobs, &concurrent, 5).unwrap();

        let sequential = RecordingEncoder::default();
        for ((asset, request), actual) in jobs.iter().zip(&results) {
            let expected = SearchController::new(&sequential).run(asset, request).unwrap();
            assert_eq!(actual.as_ref().unwrap(), &expected);
        }

        // Each search saw only its own trajectory
        assert_eq!(
            *concurrent.trajectories.lock().unwrap(),
            *sequential.trajectories.lock().unwrap()
        );
    }

    #[test]
    fn test_batch_preserves_order() {
        let assets = assets();
        let jobs = ratio_jobs(&assets, 0.5);

        let results = compress_batch(&jobs, &RecordingEncoder::default(), 2).unwrap();
        assert_eq!(results.len(), assets.len());

        let sizes: Vec<usize> = results.iter().map(|r| r.as_ref().unwrap().size()).collect();
        let mut sorted = sizes.clone();
        sorted.sort_unstable();
        assert_eq!(sizes, sorted);
    }

    #[test]
    fn test_failure_is_isolated() {
        let assets = assets();
        let mut jobs = ratio_jobs(&assets, 0.5);
        jobs[2].1.target_kb = 0.0;

        let results = compress_batch(&jobs, &RecordingEncoder::default(), 0).unwrap();

        assert!(matches!(results[2], Err(SearchError::InvalidTarget { .. })));
        for (i, result) in results.iter().enumerate() {
            if i != 2 {
                assert!(result.is_ok());
            }
        }
    }
}
