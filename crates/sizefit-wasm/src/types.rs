//! WASM-compatible wrapper types for compression results.

use serde::Serialize;
use sizefit_core::CompressionResult;
use wasm_bindgen::prelude::*;

/// Plain-object view of a result, without the buffer.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultSummary<'a> {
    pub size: usize,
    pub size_kb: f64,
    pub mime: &'a str,
    pub quality: Option<f64>,
    pub iterations: u32,
}

/// The outcome of a target-size search, accessible from JavaScript.
///
/// The encoded bytes stay in WASM memory until `bytes()` copies them out.
#[wasm_bindgen]
pub struct JsCompressionResult {
    inner: CompressionResult,
}

#[wasm_bindgen]
impl JsCompressionResult {
    /// Encoded bytes as a `Uint8Array` (copied).
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.buffer().to_vec()
    }

    /// Size of the encoded bytes.
    #[wasm_bindgen(getter)]
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    #[wasm_bindgen(getter)]
    pub fn size_kb(&self) -> f64 {
        self.inner.size_kb()
    }

    /// Media type of the encoded bytes.
    #[wasm_bindgen(getter)]
    pub fn mime(&self) -> String {
        self.inner.mime().to_string()
    }

    /// Quality that produced the bytes, or `undefined` if the original was kept.
    #[wasm_bindgen(getter)]
    pub fn quality(&self) -> Option<f64> {
        self.inner.quality()
    }

    /// Number of encoder calls made.
    #[wasm_bindgen(getter)]
    pub fn iterations(&self) -> u32 {
        self.inner.iterations()
    }

    /// Metadata as a plain object: `{ size, sizeKb, mime, quality, iterations }`.
    pub fn summary(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.to_summary())
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

impl JsCompressionResult {
    pub(crate) fn from_result(inner: CompressionResult) -> Self {
        Self { inner }
    }

    pub(crate) fn to_summary(&self) -> ResultSummary<'_> {
        ResultSummary {
            size: self.inner.size(),
            size_kb: self.inner.size_kb(),
            mime: self.inner.mime(),
            quality: self.inner.quality(),
            iterations: self.inner.iterations(),
        }
    }
}
