//! Target-size compression WASM bindings.
//!
//! Runs the whole search in the browser with the in-process encoder, so no
//! image bytes leave the page.
//!
//! # Functions
//!
//! - [`compress_to_target`] - Search toward an explicit size in KB
//! - [`compress_ratio`] - Search toward `original size × quality`
//! - [`select_codec`] - Output codec chosen for a media type
//! - [`target_size_kb`] - Target implied by a size and a quality ratio
//!
//! # Example
//!
//! ```typescript
//! import { compress_to_target } from '@sizefit/wasm';
//!
//! const bytes = new Uint8Array(await file.arrayBuffer());
//! const result = compress_to_target(bytes, file.type, 0.7, 200, { maxIterations: 6 },
//!     (percent) => progressBar.value = percent);
//! const blob = new Blob([result.bytes()], { type: result.mime });
//! ```

use crate::types::JsCompressionResult;
use serde::Deserialize;
use sizefit_core::{
    CompressionRequest, CompressionResult, ImageAsset, LocalEncoder, SearchController,
    SearchError,
};
use wasm_bindgen::prelude::*;
use web_sys::console;

/// Optional overrides passed from TypeScript as a plain object.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct SearchOptions {
    pub max_iterations: Option<u32>,
    pub tolerance: Option<f64>,
    /// Hard ceiling on any single encoded buffer, in bytes.
    pub max_bytes: Option<usize>,
}

impl SearchOptions {
    fn from_js(value: JsValue) -> Result<Self, JsValue> {
        if value.is_undefined() || value.is_null() {
            return Ok(Self::default());
        }
        serde_wasm_bindgen::from_value(value).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    pub(crate) fn apply(&self, mut request: CompressionRequest) -> CompressionRequest {
        if let Some(max_iterations) = self.max_iterations {
            request = request.with_max_iterations(max_iterations);
        }
        if let Some(tolerance) = self.tolerance {
            request = request.with_tolerance(tolerance);
        }
        request
    }

    pub(crate) fn encoder(&self) -> LocalEncoder {
        match self.max_bytes {
            Some(max_bytes) => LocalEncoder::new().with_max_bytes(max_bytes),
            None => LocalEncoder::new(),
        }
    }
}

/// Run one search with the in-process encoder.
pub(crate) fn run_search(
    asset: &ImageAsset,
    request: &CompressionRequest,
    options: &SearchOptions,
    progress: impl FnMut(u8),
) -> Result<CompressionResult, SearchError> {
    let encoder = options.encoder();
    SearchController::new(&encoder)
        .with_progress(progress)
        .run(asset, request)
}

fn search_js(
    bytes: &[u8],
    mime: &str,
    request: CompressionRequest,
    options: JsValue,
    on_progress: Option<js_sys::Function>,
) -> Result<JsCompressionResult, JsValue> {
    let options = SearchOptions::from_js(options)?;
    let request = options.apply(request);
    let asset = ImageAsset::new(bytes.to_vec(), mime);

    let progress = |percent: u8| {
        if let Some(callback) = on_progress.as_ref() {
            // A throwing callback must not abort the search
            let _ = callback.call1(&JsValue::NULL, &JsValue::from(percent));
        }
    };

    let result = run_search(&asset, &request, &options, progress)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    console::log_1(
        &format!(
            "sizefit: {} -> {} bytes ({}) in {} probes",
            asset.len(),
            result.size(),
            result.mime(),
            result.iterations()
        )
        .into(),
    );

    Ok(JsCompressionResult::from_result(result))
}

/// Compress an image toward `target_kb`.
///
/// # Arguments
///
/// * `bytes` - Original file bytes
/// * `mime` - Declared media type of the file (`File.type`)
/// * `quality` - Starting quality in `[0.1, 1]`; also the upper bound of the search
/// * `target_kb` - Desired output size in KB (1 KB = 1024 bytes)
/// * `options` - `undefined` or `{ maxIterations?, tolerance?, maxBytes? }`
/// * `on_progress` - Called with a percentage before each probe and 100 at the end
///
/// # Errors
///
/// Returns an error string if the target is not positive, if the options object
/// is malformed, or if an encode fails.
#[wasm_bindgen]
pub fn compress_to_target(
    bytes: &[u8],
    mime: &str,
    quality: f64,
    target_kb: f64,
    options: JsValue,
    on_progress: Option<js_sys::Function>,
) -> Result<JsCompressionResult, JsValue> {
    search_js(
        bytes,
        mime,
        CompressionRequest::new(quality, target_kb),
        options,
        on_progress,
    )
}

/// Compress an image toward `original size × quality`.
#[wasm_bindgen]
pub fn compress_ratio(
    bytes: &[u8],
    mime: &str,
    quality: f64,
    options: JsValue,
    on_progress: Option<js_sys::Function>,
) -> Result<JsCompressionResult, JsValue> {
    let target_kb = sizefit_core::target_size_kb(bytes.len(), quality);
    search_js(
        bytes,
        mime,
        CompressionRequest::new(quality, target_kb),
        options,
        on_progress,
    )
}

/// Output codec name (`jpeg`, `webp`, `png` or `passthrough`) for a media type.
#[wasm_bindgen]
pub fn select_codec(mime: &str) -> String {
    sizefit_core::select_codec(mime).as_str().to_string()
}

/// Target size in KB for a file of `len` bytes at `quality`.
#[wasm_bindgen]
pub fn target_size_kb(len: usize, quality: f64) -> f64 {
    sizefit_core::target_size_kb(len, quality)
}

/// Tests for compression bindings.
///
/// Functions returning `Result<T, JsValue>` only run on wasm32; the shared
/// search path is tested here through `run_search`.
#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn noisy_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) as u8;
            Rgb([v, v.wrapping_mul(3), v.wrapping_add(x as u8)])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_select_codec_names() {
        assert_eq!(select_codec("image/jpeg"), "jpeg");
        assert_eq!(select_codec("image/png"), "webp");
        assert_eq!(select_codec("image/gif"), "passthrough");
    }

    #[test]
    fn test_target_size_kb() {
        assert!((target_size_kb(2048, 0.5) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_options_override_request() {
        let options = SearchOptions {
            max_iterations: Some(3),
            tolerance: Some(0.2),
            max_bytes: None,
        };
        let request = options.apply(CompressionRequest::new(0.7, 100.0));
        assert_eq!(request.max_iterations, 3);
        assert!((request.tolerance - 0.2).abs() < f64::EPSILON);

        let untouched = SearchOptions::default().apply(CompressionRequest::new(0.7, 100.0));
        assert_eq!(untouched, CompressionRequest::new(0.7, 100.0));
    }

    #[test]
    fn test_run_search_reports_progress() {
        let bytes = noisy_jpeg(64, 64);
        let asset = ImageAsset::new(bytes.clone(), "image/jpeg");
        let request = CompressionRequest::new(0.8, sizefit_core::target_size_kb(bytes.len(), 0.5))
            .with_max_iterations(4);

        let mut seen = Vec::new();
        let result =
            run_search(&asset, &request, &SearchOptions::default(), |p| seen.push(p)).unwrap();

        assert_eq!(result.mime(), "image/jpeg");
        assert!(result.iterations() >= 1 && result.iterations() <= 4);
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_run_search_rejects_zero_target() {
        let asset = ImageAsset::new(noisy_jpeg(8, 8), "image/jpeg");
        let request = CompressionRequest::new(0.7, 0.0);

        let mut calls = 0;
        let result = run_search(&asset, &request, &SearchOptions::default(), |_| calls += 1);

        assert!(matches!(result, Err(SearchError::InvalidTarget { .. })));
        assert_eq!(calls, 0);
    }
}
