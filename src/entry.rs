// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Index entry records as read from and written to the `search_entries`
//! table.

use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::error::SearchError;
use crate::model::PrimaryKey;

/// A hydrated row from `search_entries`, as returned by search operations.
///
/// `rank` is only populated when the query asked for ranking and the active
/// backend can compute one; it is never stored.
#[derive(Debug)]
pub struct SearchEntry {
    pub id: i64,
    pub engine_slug: String,
    pub content_type: String,
    pub object_id: String,
    pub object_id_int: Option<i64>,
    pub title: String,
    pub description: String,
    pub content: String,
    pub url: String,
    pub meta_encoded: String,
    pub rank: Option<f64>,
    meta_cache: OnceLock<Map<String, Value>>,
}

impl SearchEntry {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: i64,
        engine_slug: String,
        content_type: String,
        object_id: String,
        object_id_int: Option<i64>,
        title: String,
        description: String,
        content: String,
        url: String,
        meta_encoded: String,
        rank: Option<f64>,
    ) -> Self {
        Self {
            id,
            engine_slug,
            content_type,
            object_id,
            object_id_int,
            title,
            description,
            content,
            url,
            meta_encoded,
            rank,
            meta_cache: OnceLock::new(),
        }
    }

    /// Stored field values, decoded lazily from `meta_encoded` on first
    /// access and cached for the lifetime of the entry.
    pub fn meta(&self) -> Result<&Map<String, Value>, SearchError> {
        if let Some(meta) = self.meta_cache.get() {
            return Ok(meta);
        }
        let decoded: Map<String, Value> = serde_json::from_str(&self.meta_encoded)
            .map_err(|e| SearchError::Adapter(format!("invalid stored meta: {e}")))?;
        Ok(self.meta_cache.get_or_init(|| decoded))
    }
}

impl Clone for SearchEntry {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            engine_slug: self.engine_slug.clone(),
            content_type: self.content_type.clone(),
            object_id: self.object_id.clone(),
            object_id_int: self.object_id_int,
            title: self.title.clone(),
            description: self.description.clone(),
            content: self.content.clone(),
            url: self.url.clone(),
            meta_encoded: self.meta_encoded.clone(),
            rank: self.rank,
            meta_cache: OnceLock::new(),
        }
    }
}

/// Extracted field data for one object, ready to be written into an entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryData {
    pub title: String,
    pub description: String,
    pub content: String,
    pub url: String,
    pub meta_encoded: String,
}

/// A row pending insertion into `search_entries`.
#[derive(Debug, Clone)]
pub struct NewSearchEntry {
    pub engine_slug: String,
    pub content_type: String,
    pub object_id: String,
    pub object_id_int: Option<i64>,
    pub data: EntryData,
}

/// One match from a model-scoped filter: the model's own primary key plus
/// the backend rank when ranking was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterHit {
    pub pk: PrimaryKey,
    pub rank: Option<f64>,
}

/// Outcome of a full index rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Objects whose entries were refreshed or created.
    pub refreshed: usize,
    /// Stale entries deleted (unregistered types, dead duplicates).
    pub deleted: usize,
}
