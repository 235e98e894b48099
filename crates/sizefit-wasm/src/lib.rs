//! Sizefit WASM - in-browser target-size compression
//!
//! This crate exposes the sizefit-core search to JavaScript/TypeScript so the
//! upload page can compress without a server round trip.
//!
//! # Module Structure
//!
//! - `compress` - Search entry points and codec helpers
//! - `types` - WASM-compatible wrapper for the search result
//!
//! # Usage
//!
//! ```typescript
//! import init, { compress_ratio } from '@sizefit/wasm';
//!
//! // Initialize WASM module (must call first)
//! await init();
//!
//! const bytes = new Uint8Array(await file.arrayBuffer());
//! const result = compress_ratio(bytes, file.type, 0.7, undefined, undefined);
//! console.log(`${bytes.length} -> ${result.size} bytes`);
//! ```

use wasm_bindgen::prelude::*;

mod compress;
mod types;

pub use compress::{compress_ratio, compress_to_target, select_codec, target_size_kb};
pub use types::JsCompressionResult;

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
