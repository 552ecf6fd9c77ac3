// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Match strategies: translating search text into SQL fragments.
//!
//! Backends never execute queries themselves. They emit [`SqlFragment`]s
//! (a clause plus bind parameters) that the store composes into full
//! statements, so user text always travels as a bound parameter.

mod like;
mod mysql;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::AnyPool;

pub use like::LikeSearchBackend;
pub use mysql::MySqlSearchBackend;
pub use postgres::PostgresSearchBackend;

use crate::error::SearchError;
use crate::model::ModelDescriptor;

/// Database flavor behind the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, SearchError> {
        if url.starts_with("sqlite:") {
            Ok(Dialect::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(Dialect::Postgres)
        } else if url.starts_with("mysql:") || url.starts_with("mariadb:") {
            Ok(Dialect::MySql)
        } else {
            Err(SearchError::Backend(format!(
                "unsupported database URL scheme: {url}"
            )))
        }
    }
}

/// A bind parameter carried alongside a SQL clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
}

/// A clause with positional `?` placeholders and the values bound to them,
/// in order of appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<SqlParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// A condition no row satisfies. Used wherever an empty id set or an
    /// unmatchable query must yield zero results instead of invalid SQL.
    pub fn never() -> Self {
        Self::new("1 = 0")
    }

    /// A condition every row satisfies.
    pub fn always() -> Self {
        Self::new("1 = 1")
    }
}

/// Replace characters with meaning to a backend's query language by spaces,
/// then collapse runs of whitespace. The result is a plain word list.
pub(crate) fn sanitize_words(text: &str, strip: &[char]) -> Vec<String> {
    let cleaned: String = text
        .chars()
        .map(|ch| if strip.contains(&ch) { ' ' } else { ch })
        .collect();
    cleaned.split_whitespace().map(str::to_owned).collect()
}

/// A match strategy for one database flavor.
///
/// `do_search` / `do_search_ranking` operate over entry text columns;
/// `do_filter` / `do_filter_ranking` additionally join entries back onto a
/// model's own table. Installation hooks cover backends that need schema
/// beyond the base entry table (tsvector columns, fulltext indexes).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Whether this backend computes meaningful relevance ranks.
    fn supports_ranking(&self) -> bool {
        false
    }

    /// Whether trailing word fragments match ("sear" finds "search").
    fn supports_prefix_matching(&self) -> bool {
        true
    }

    /// Whether [`do_install`](Self::do_install) must run before searching.
    fn requires_installation(&self) -> bool {
        false
    }

    async fn is_installed(&self, _pool: &AnyPool) -> Result<bool, SearchError> {
        Ok(true)
    }

    async fn do_install(&self, _pool: &AnyPool) -> Result<(), SearchError> {
        Ok(())
    }

    async fn do_uninstall(&self, _pool: &AnyPool) -> Result<(), SearchError> {
        Ok(())
    }

    /// Condition over `search_entries` matching `search_text`.
    fn do_search(&self, search_text: &str) -> SqlFragment;

    /// Rank expression paired with [`do_search`](Self::do_search). The
    /// default is a constant for backends with no rank notion.
    fn do_search_ranking(&self, _search_text: &str) -> SqlFragment {
        SqlFragment::new("1.0")
    }

    /// Condition joining `search_entries` onto `model`'s table and matching
    /// `search_text`, scoped to one engine. Parameters appear in clause
    /// order.
    fn do_filter(
        &self,
        engine_slug: &str,
        model: &ModelDescriptor,
        search_text: &str,
    ) -> SqlFragment;

    /// Rank expression paired with [`do_filter`](Self::do_filter).
    fn do_filter_ranking(&self, _model: &ModelDescriptor, _search_text: &str) -> SqlFragment {
        SqlFragment::new("1.0")
    }
}

/// Backend selection policy, set in [`SearchConfig`](crate::SearchConfig).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pick the native full-text backend for the connected database,
    /// falling back to LIKE matching.
    #[default]
    Adaptive,
    /// Force portable LIKE matching regardless of database.
    Like,
    /// Force the PostgreSQL tsvector backend.
    Postgres,
    /// Force the MySQL boolean full-text backend.
    Mysql,
}

/// Resolve a configured kind against the connected dialect.
pub(crate) fn backend_for(
    kind: BackendKind,
    dialect: Dialect,
    postgres_search_config: &str,
) -> Arc<dyn SearchBackend> {
    match kind {
        BackendKind::Adaptive => match dialect {
            Dialect::Postgres => {
                Arc::new(PostgresSearchBackend::new(postgres_search_config))
            }
            Dialect::MySql => Arc::new(MySqlSearchBackend),
            Dialect::Sqlite => Arc::new(LikeSearchBackend::new(dialect)),
        },
        BackendKind::Like => Arc::new(LikeSearchBackend::new(dialect)),
        BackendKind::Postgres => Arc::new(PostgresSearchBackend::new(postgres_search_config)),
        BackendKind::Mysql => Arc::new(MySqlSearchBackend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_dialect_detection() {
        assert_eq!(
            Dialect::from_url("sqlite:///tmp/x.db?mode=rwc").unwrap(),
            Dialect::Sqlite
        );
        assert_eq!(
            Dialect::from_url("postgres://u:p@localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("postgresql://u:p@localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("mysql://u:p@localhost/db").unwrap(),
            Dialect::MySql
        );
    }

    #[test]
    fn failure_unknown_scheme() {
        assert!(Dialect::from_url("redis://localhost").is_err());
    }

    #[test]
    fn happy_sanitize_strips_and_collapses() {
        let words = sanitize_words("  hello &  (world)\n\tthird", &['&', '(', ')']);
        assert_eq!(words, vec!["hello", "world", "third"]);
        assert!(sanitize_words("&&&", &['&']).is_empty());
        assert!(sanitize_words("", &[]).is_empty());
    }

    #[test]
    fn happy_adaptive_selection() {
        let b = backend_for(BackendKind::Adaptive, Dialect::Sqlite, "pg_catalog.english");
        assert!(!b.supports_ranking());
        let b = backend_for(BackendKind::Adaptive, Dialect::Postgres, "pg_catalog.english");
        assert!(b.supports_ranking() && b.requires_installation());
        let b = backend_for(BackendKind::Adaptive, Dialect::MySql, "pg_catalog.english");
        assert!(b.supports_ranking() && b.requires_installation());
        let b = backend_for(BackendKind::Like, Dialect::MySql, "pg_catalog.english");
        assert!(!b.requires_installation());
    }
}
