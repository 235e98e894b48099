//! Per-upload bookkeeping for a compression session.
//!
//! Each uploaded image is an [`Item`] with a stable [`ItemId`] and one
//! [`VariantState`] per encoder variant (local and remote). A search only ever
//! touches the item it belongs to: single runs take `&mut Item`, and
//! [`Session::compress_all`] hands each parallel task exclusive access to one
//! item, so no state is shared between concurrent searches.

use crate::asset::{CompressionRequest, CompressionResult, ImageAsset};
use crate::encode::Encoder;
use crate::search::{CancelToken, SearchController, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Stable identifier of an uploaded item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(u64);

impl ItemId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Which encoder backend a run used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderVariant {
    Local,
    Remote,
}

/// Errors from session operations.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("Unknown item: {0:?}")]
    UnknownItem(ItemId),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Progress and outcome of one variant for one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantState {
    busy: bool,
    progress: u8,
    result: Option<CompressionResult>,
    error: Option<String>,
}

impl VariantState {
    /// Whether a search is currently running.
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Last reported progress (0-100).
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Most recent successful result.
    pub fn result(&self) -> Option<&CompressionResult> {
        self.result.as_ref()
    }

    /// Message of the most recent failure, cleared on success.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn begin(&mut self) {
        self.busy = true;
        self.progress = 0;
        self.error = None;
    }

    fn finish(&mut self, result: CompressionResult) -> &CompressionResult {
        self.busy = false;
        self.progress = 100;
        self.result.insert(result)
    }

    // A failed run leaves the previous result in place
    fn fail(&mut self, err: &SearchError) {
        self.busy = false;
        self.progress = 0;
        self.error = Some(err.to_string());
    }
}

/// One uploaded image and its per-variant state.
#[derive(Debug, Clone)]
pub struct Item {
    id: ItemId,
    name: String,
    asset: ImageAsset,
    local: VariantState,
    remote: VariantState,
}

impl Item {
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Original file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn asset(&self) -> &ImageAsset {
        &self.asset
    }

    pub fn variant(&self, variant: EncoderVariant) -> &VariantState {
        match variant {
            EncoderVariant::Local => &self.local,
            EncoderVariant::Remote => &self.remote,
        }
    }

    /// Whether any variant is running.
    pub fn is_busy(&self) -> bool {
        self.local.busy || self.remote.busy
    }

    /// Run a search for this item, targeting `asset size × quality`.
    ///
    /// # Errors
    ///
    /// See [`Item::compress_request`].
    pub fn compress(
        &mut self,
        variant: EncoderVariant,
        quality: f64,
        encoder: &dyn Encoder,
        cancel: Option<CancelToken>,
    ) -> Result<&CompressionResult, SearchError> {
        let request = CompressionRequest::from_ratio(&self.asset, quality);
        self.compress_request(variant, &request, encoder, cancel)
    }

    /// Run a search for this item with an explicit request.
    ///
    /// Progress is written into the variant's state as it is reported.
    ///
    /// # Errors
    ///
    /// Returns the search error; it is also recorded on the variant.
    pub fn compress_request(
        &mut self,
        variant: EncoderVariant,
        request: &CompressionRequest,
        encoder: &dyn Encoder,
        cancel: Option<CancelToken>,
    ) -> Result<&CompressionResult, SearchError> {
        let Item {
            id,
            asset,
            local,
            remote,
            ..
        } = self;
        let state = match variant {
            EncoderVariant::Local => local,
            EncoderVariant::Remote => remote,
        };

        state.begin();
        let mut controller = SearchController::new(encoder);
        if let Some(token) = cancel {
            controller = controller.with_cancel(token);
        }
        let outcome = controller
            .with_progress(|percent| state.progress = percent)
            .run(asset, request);

        match outcome {
            Ok(result) => Ok(state.finish(result)),
            Err(err) => {
                tracing::warn!(item = id.get(), ?variant, error = %err, "item compression failed");
                state.fail(&err);
                Err(err)
            }
        }
    }
}

/// All items of one upload session, keyed by [`ItemId`].
#[derive(Debug, Default)]
pub struct Session {
    next_id: u64,
    items: BTreeMap<ItemId, Item>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an uploaded file and return its id.
    pub fn add(&mut self, name: impl Into<String>, asset: ImageAsset) -> ItemId {
        let id = ItemId(self.next_id);
        self.next_id += 1;
        self.items.insert(
            id,
            Item {
                id,
                name: name.into(),
                asset,
                local: VariantState::default(),
                remote: VariantState::default(),
            },
        );
        id
    }

    /// Replace every item with a new upload, as a fresh file selection does.
    ///
    /// Ids are never reused.
    pub fn replace_all(&mut self, uploads: Vec<(String, ImageAsset)>) -> Vec<ItemId> {
        self.items.clear();
        uploads
            .into_iter()
            .map(|(name, asset)| self.add(name, asset))
            .collect()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    pub fn remove(&mut self, id: ItemId) -> Option<Item> {
        self.items.remove(&id)
    }

    /// Items in upload order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether any item has a search running.
    pub fn is_any_busy(&self) -> bool {
        self.items.values().any(Item::is_busy)
    }

    /// Compress one item.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownItem`] for a missing id, otherwise the
    /// search error.
    pub fn compress(
        &mut self,
        id: ItemId,
        variant: EncoderVariant,
        quality: f64,
        encoder: &dyn Encoder,
        cancel: Option<CancelToken>,
    ) -> Result<&CompressionResult, SessionError> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or(SessionError::UnknownItem(id))?;
        Ok(item.compress(variant, quality, encoder, cancel)?)
    }

    /// Compress one item toward an explicit request.
    ///
    /// # Errors
    ///
    /// Same as [`Session::compress`].
    pub fn compress_request(
        &mut self,
        id: ItemId,
        variant: EncoderVariant,
        request: &CompressionRequest,
        encoder: &dyn Encoder,
        cancel: Option<CancelToken>,
    ) -> Result<&CompressionResult, SessionError> {
        let item = self
            .items
            .get_mut(&id)
            .ok_or(SessionError::UnknownItem(id))?;
        Ok(item.compress_request(variant, request, encoder, cancel)?)
    }

    /// Compress every item concurrently, each in its own task.
    ///
    /// Returns one outcome per item in upload order.
    #[cfg(feature = "parallel")]
    pub fn compress_all(
        &mut self,
        variant: EncoderVariant,
        quality: f64,
        encoder: &dyn Encoder,
    ) -> Vec<(ItemId, Result<(), SearchError>)> {
        use rayon::prelude::*;

        self.items
            .par_iter_mut()
            .map(|(id, item)| {
                let outcome = item
                    .compress(variant, quality, encoder, None)
                    .map(|_| ());
                (*id, outcome)
            })
            .collect()
    }
}
