// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Field extraction: turning a [`Searchable`] object into index entry data.
//!
//! A [`SearchAdapter`] is built once per registered model from an
//! [`AdapterConfig`]. It decides which fields feed the searchable text
//! columns, which are stored verbatim on the entry for display, and how the
//! title/description/content/url values are produced.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::SearchError;
use crate::model::{FieldValue, ModelDescriptor, PrimaryKey, Searchable};

/// Computes a text value for an object, overriding default field resolution.
pub type ExtractFn = Arc<dyn Fn(&dyn Searchable) -> String + Send + Sync>;

/// Reports the primary keys of objects currently live (visible) for a model.
/// When present, search results are restricted to these objects.
pub type LiveIdsFn = Arc<dyn Fn() -> Vec<PrimaryKey> + Send + Sync>;

/// Per-model extraction policy.
///
/// Everything defaults to sensible behavior driven by the model descriptor;
/// hosts override only what they need.
#[derive(Clone, Default)]
pub struct AdapterConfig {
    /// Fields to index. Empty means the descriptor's `text_fields`.
    pub fields: Vec<String>,
    /// Fields excluded from indexing. Exclusion is authoritative: a field
    /// named in both `fields` and `exclude` is not indexed.
    pub exclude: Vec<String>,
    /// Fields whose values are additionally stored on the entry meta for
    /// display without a database round trip.
    pub store: Vec<String>,
    /// Override for the entry title (default: the object's display form).
    pub title: Option<ExtractFn>,
    /// Override for the entry description (default: empty).
    pub description: Option<ExtractFn>,
    /// Override for the entry content (default: all indexed fields,
    /// concatenated).
    pub content: Option<ExtractFn>,
    /// Override for the entry URL (default: the object's absolute URL).
    pub url: Option<ExtractFn>,
    /// Named computed fields, consulted when the object lacks the field.
    pub extra: HashMap<String, ExtractFn>,
    /// Live-object restriction for this model.
    pub live: Option<LiveIdsFn>,
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("fields", &self.fields)
            .field("exclude", &self.exclude)
            .field("store", &self.store)
            .field("title", &self.title.is_some())
            .field("description", &self.description.is_some())
            .field("content", &self.content.is_some())
            .field("url", &self.url.is_some())
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .field("live", &self.live.is_some())
            .finish()
    }
}

/// Extraction machinery for one registered model.
pub struct SearchAdapter {
    descriptor: &'static ModelDescriptor,
    config: AdapterConfig,
    title_max_chars: usize,
}

impl SearchAdapter {
    pub fn new(
        descriptor: &'static ModelDescriptor,
        config: AdapterConfig,
        title_max_chars: usize,
    ) -> Self {
        Self {
            descriptor,
            config,
            title_max_chars,
        }
    }

    pub fn descriptor(&self) -> &'static ModelDescriptor {
        self.descriptor
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// The effective indexed field set: configured fields (or the
    /// descriptor defaults) minus exclusions.
    pub fn field_names(&self) -> Vec<&str> {
        let base: Vec<&str> = if self.config.fields.is_empty() {
            self.descriptor.text_fields.to_vec()
        } else {
            self.config.fields.iter().map(String::as_str).collect()
        };
        base.into_iter()
            .filter(|name| !self.config.exclude.iter().any(|ex| ex == name))
            .collect()
    }

    /// Resolve one field to plain text: a path walk through the object
    /// graph, falling back to a same-named `extra` extractor when the
    /// object itself lacks the field. Paths accept `a.b` and `a__b` forms.
    pub fn resolve_field(
        &self,
        obj: &dyn Searchable,
        name: &str,
    ) -> Result<String, SearchError> {
        let path = name.replace("__", ".");
        let head = path.split('.').next().unwrap_or(&path);
        if obj.field(head).is_none() {
            if let Some(extract) = self.config.extra.get(name) {
                return Ok(extract(obj));
            }
        }
        resolve_path(obj, &path, name)
    }

    pub fn title(&self, obj: &dyn Searchable) -> String {
        let raw = match &self.config.title {
            Some(extract) => extract(obj),
            None => obj.display(),
        };
        truncate_chars(&strip_tags(&raw), self.title_max_chars)
    }

    pub fn description(&self, obj: &dyn Searchable) -> String {
        match &self.config.description {
            Some(extract) => strip_tags(&extract(obj)),
            None => String::new(),
        }
    }

    pub fn content(&self, obj: &dyn Searchable) -> Result<String, SearchError> {
        if let Some(extract) = &self.config.content {
            return Ok(strip_tags(&extract(obj)));
        }
        let mut parts = Vec::new();
        for name in self.field_names() {
            parts.push(self.resolve_field(obj, name)?);
        }
        Ok(strip_tags(&parts.join(" ")))
    }

    pub fn url(&self, obj: &dyn Searchable) -> String {
        match &self.config.url {
            Some(extract) => extract(obj),
            None => obj.absolute_url().unwrap_or_default(),
        }
    }

    /// Stored field values for the entry meta.
    pub fn meta(&self, obj: &dyn Searchable) -> Result<Map<String, Value>, SearchError> {
        let mut meta = Map::new();
        for name in &self.config.store {
            let value = self.resolve_field(obj, name)?;
            meta.insert(name.clone(), Value::String(value));
        }
        Ok(meta)
    }

    pub fn serialize_meta(&self, obj: &dyn Searchable) -> Result<String, SearchError> {
        let meta = self.meta(obj)?;
        serde_json::to_string(&Value::Object(meta))
            .map_err(|e| SearchError::Adapter(format!("meta did not serialize: {e}")))
    }

    /// Live primary keys for this model, if the config restricts them.
    pub fn live_ids(&self) -> Option<Vec<PrimaryKey>> {
        self.config.live.as_ref().map(|live| live())
    }
}

fn resolve_path(
    obj: &dyn Searchable,
    path: &str,
    full_path: &str,
) -> Result<String, SearchError> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let value = obj.field(head).ok_or_else(|| {
        SearchError::Adapter(format!(
            "unknown field `{full_path}` on {}",
            obj.descriptor().content_type
        ))
    })?;
    match value {
        FieldValue::Text(text) => match rest {
            None => Ok(text),
            Some(_) => Err(SearchError::Adapter(format!(
                "field `{full_path}` on {} dereferences a plain text value",
                obj.descriptor().content_type
            ))),
        },
        FieldValue::Null => Ok(String::new()),
        FieldValue::Related(related) => match rest {
            Some(rest) => resolve_path(related.as_ref(), rest, full_path),
            None => Ok(related.display()),
        },
        FieldValue::Many(members) => {
            let mut parts = Vec::with_capacity(members.len());
            for member in &members {
                parts.push(match rest {
                    Some(rest) => resolve_path(member.as_ref(), rest, full_path)?,
                    None => member.display(),
                });
            }
            Ok(parts.join(" "))
        }
    }
}

/// Drop anything between `<` and `>`. Indexed text comes from rich-text
/// fields often enough that markup would otherwise pollute matching.
pub(crate) fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
