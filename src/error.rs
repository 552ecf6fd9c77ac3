// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the search layer.

use thiserror::Error;

/// Errors surfaced by engines, adapters, contexts and the SQL store.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Registration bookkeeping went wrong: registering a type twice,
    /// operating on an unregistered type, or reusing an engine slug.
    #[error("registration error: {0}")]
    Registration(String),

    /// Field extraction failed while building index data for an object.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// Search context misuse: closing or marking a scope when none is open,
    /// or leaving scopes open past the end of a unit of work.
    #[error("search context error: {0}")]
    Context(String),

    /// The underlying database rejected an operation.
    #[error("search backend error: {0}")]
    Backend(String),
}

impl SearchError {
    /// True when the error indicates a misconfigured or unavailable database
    /// rather than caller misuse.
    pub fn is_backend(&self) -> bool {
        matches!(self, SearchError::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_display_includes_category() {
        let e = SearchError::Registration("already registered: blog.post".into());
        assert!(e.to_string().contains("registration"));
        assert!(e.to_string().contains("blog.post"));
        assert!(!e.is_backend());
    }

    #[test]
    fn happy_backend_predicate() {
        assert!(SearchError::Backend("connection refused".into()).is_backend());
    }
}
