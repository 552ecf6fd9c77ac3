// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Native PostgreSQL backend built on tsvector full-text search.
//!
//! Installation adds a weighted `search_tsv` column to `search_entries`
//! (title A, description C, content D), a GIN index over it, and a trigger
//! keeping it current on every write. Queries are conjunctive prefix
//! tsqueries ranked with `ts_rank_cd`.

use async_trait::async_trait;
use sqlx::AnyPool;
use tracing::debug;

use crate::backend::{sanitize_words, SearchBackend, SqlFragment, SqlParam};
use crate::error::SearchError;
use crate::model::{ModelDescriptor, PkKind};

/// Characters with meaning in the tsquery language, stripped from user
/// text. Quotes and backslashes are included so generated lexeme quoting
/// can never be broken out of.
const TSQUERY_STRIP: [char; 10] = ['&', ':', '(', '|', ')', '!', '>', '<', '\'', '\\'];

pub struct PostgresSearchBackend {
    search_config: String,
}

impl PostgresSearchBackend {
    pub fn new(search_config: &str) -> Self {
        Self {
            search_config: search_config.to_string(),
        }
    }

    /// Conjunctive prefix tsquery for the given text, e.g.
    /// `'hello':* & 'wor':*`. `None` when nothing survives sanitizing.
    fn ts_query(&self, search_text: &str) -> Option<String> {
        let words = sanitize_words(search_text, &TSQUERY_STRIP);
        if words.is_empty() {
            return None;
        }
        Some(
            words
                .iter()
                .map(|w| format!("'{w}':*"))
                .collect::<Vec<_>>()
                .join(" & "),
        )
    }

    fn match_fragment(&self, search_text: &str) -> SqlFragment {
        match self.ts_query(search_text) {
            Some(query) => SqlFragment::with_params(
                format!(
                    "search_entries.search_tsv @@ to_tsquery('{}', ?)",
                    self.search_config
                ),
                vec![SqlParam::Text(query)],
            ),
            None => SqlFragment::never(),
        }
    }

    fn rank_fragment(&self, search_text: &str) -> SqlFragment {
        match self.ts_query(search_text) {
            Some(query) => SqlFragment::with_params(
                format!(
                    "ts_rank_cd(search_entries.search_tsv, to_tsquery('{}', ?))",
                    self.search_config
                ),
                vec![SqlParam::Text(query)],
            ),
            None => SqlFragment::new("0.0"),
        }
    }
}

#[async_trait]
impl SearchBackend for PostgresSearchBackend {
    fn supports_ranking(&self) -> bool {
        true
    }

    fn requires_installation(&self) -> bool {
        true
    }

    async fn is_installed(&self, pool: &AnyPool) -> Result<bool, SearchError> {
        let row = sqlx::query(
            "SELECT 1 FROM pg_attribute a \
             JOIN pg_class c ON a.attrelid = c.oid \
             WHERE c.relname = 'search_entries' \
               AND a.attname = 'search_tsv' \
               AND NOT a.attisdropped",
        )
        .fetch_optional(pool)
        .await
        .map_err(|e| SearchError::Backend(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn do_install(&self, pool: &AnyPool) -> Result<(), SearchError> {
        let cfg = &self.search_config;
        let statements = [
            "ALTER TABLE search_entries ADD COLUMN search_tsv tsvector NOT NULL DEFAULT ''"
                .to_string(),
            "CREATE INDEX search_entries_tsv ON search_entries USING gin(search_tsv)"
                .to_string(),
            format!(
                "CREATE FUNCTION search_entries_tsv_update() RETURNS trigger AS $$ \
                 begin \
                   new.search_tsv := \
                     setweight(to_tsvector('{cfg}', coalesce(new.title, '')), 'A') || \
                     setweight(to_tsvector('{cfg}', coalesce(new.description, '')), 'C') || \
                     setweight(to_tsvector('{cfg}', coalesce(new.content, '')), 'D'); \
                   return new; \
                 end \
                 $$ LANGUAGE plpgsql"
            ),
            "CREATE TRIGGER search_entries_tsv_trigger BEFORE INSERT OR UPDATE \
             ON search_entries FOR EACH ROW EXECUTE PROCEDURE search_entries_tsv_update()"
                .to_string(),
            // Rewrite existing rows so the trigger backfills their vectors.
            "UPDATE search_entries SET id = id".to_string(),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| SearchError::Backend(e.to_string()))?;
        }
        debug!("installed postgres tsvector search support");
        Ok(())
    }

    async fn do_uninstall(&self, pool: &AnyPool) -> Result<(), SearchError> {
        let statements = [
            "DROP TRIGGER IF EXISTS search_entries_tsv_trigger ON search_entries",
            "DROP FUNCTION IF EXISTS search_entries_tsv_update()",
            "ALTER TABLE search_entries DROP COLUMN IF EXISTS search_tsv",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| SearchError::Backend(e.to_string()))?;
        }
        debug!("removed postgres tsvector search support");
        Ok(())
    }

    fn do_search(&self, search_text: &str) -> SqlFragment {
        self.match_fragment(search_text)
    }

    fn do_search_ranking(&self, search_text: &str) -> SqlFragment {
        self.rank_fragment(search_text)
    }

    fn do_filter(
        &self,
        engine_slug: &str,
        model: &ModelDescriptor,
        search_text: &str,
    ) -> SqlFragment {
        let pk_column = format!("{}.{}", model.db_table, model.pk_column);
        let join = match model.pk_kind {
            PkKind::Int => format!("search_entries.object_id_int = {pk_column}"),
            PkKind::Uuid => format!("search_entries.object_id::uuid = {pk_column}"),
            PkKind::BigInt | PkKind::Text => {
                format!("search_entries.object_id = {pk_column}::text")
            }
        };
        let matched = self.match_fragment(search_text);
        let mut params = vec![
            SqlParam::Text(engine_slug.to_string()),
            SqlParam::Text(model.content_type.to_string()),
        ];
        params.extend(matched.params);
        SqlFragment::with_params(
            format!(
                "search_entries.engine_slug = ? AND search_entries.content_type = ? \
                 AND {join} AND ({})",
                matched.sql
            ),
            params,
        )
    }

    fn do_filter_ranking(&self, _model: &ModelDescriptor, search_text: &str) -> SqlFragment {
        self.rank_fragment(search_text)
    }
}
