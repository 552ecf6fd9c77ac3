// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Native MySQL backend built on boolean-mode full-text search.
//!
//! Installation converts `search_entries` to the MyISAM engine (full-text
//! capable regardless of server vintage) and creates one composite plus
//! three per-column FULLTEXT indexes. Queries are boolean-mode `+word*`
//! terms; rank weights title matches over description over content.

use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use tracing::debug;

use crate::backend::{sanitize_words, SearchBackend, SqlFragment, SqlParam};
use crate::error::SearchError;
use crate::model::{ModelDescriptor, PkKind};

/// Boolean-mode operators stripped from user text.
const BOOLEAN_STRIP: [char; 10] = ['"', '(', ')', '>', '<', '~', '*', '+', '-', '@'];

const COMPOSITE_INDEX: &str = "search_entries_fulltext";

pub struct MySqlSearchBackend;

impl MySqlSearchBackend {
    /// Boolean-mode query for the given text, e.g. `+hello* +world*`.
    /// Every term is required; trailing `*` enables prefix matching.
    fn boolean_query(search_text: &str) -> Option<String> {
        let words = sanitize_words(search_text, &BOOLEAN_STRIP);
        if words.is_empty() {
            return None;
        }
        Some(
            words
                .iter()
                .map(|w| format!("+{w}*"))
                .collect::<Vec<_>>()
                .join(" "),
        )
    }

    fn match_fragment(search_text: &str) -> SqlFragment {
        match Self::boolean_query(search_text) {
            Some(query) => SqlFragment::with_params(
                "MATCH (search_entries.title, search_entries.description, \
                 search_entries.content) AGAINST (? IN BOOLEAN MODE)"
                    .to_string(),
                vec![SqlParam::Text(query)],
            ),
            None => SqlFragment::never(),
        }
    }

    fn rank_fragment(search_text: &str) -> SqlFragment {
        match Self::boolean_query(search_text) {
            Some(query) => SqlFragment::with_params(
                "((MATCH (search_entries.title) AGAINST (? IN BOOLEAN MODE)) * 3) + \
                 ((MATCH (search_entries.description) AGAINST (? IN BOOLEAN MODE)) * 2) + \
                 ((MATCH (search_entries.content) AGAINST (? IN BOOLEAN MODE)) * 1)"
                    .to_string(),
                vec![
                    SqlParam::Text(query.clone()),
                    SqlParam::Text(query.clone()),
                    SqlParam::Text(query),
                ],
            ),
            None => SqlFragment::new("0.0"),
        }
    }
}

#[async_trait]
impl SearchBackend for MySqlSearchBackend {
    fn supports_ranking(&self) -> bool {
        true
    }

    fn requires_installation(&self) -> bool {
        true
    }

    async fn is_installed(&self, pool: &AnyPool) -> Result<bool, SearchError> {
        let row = sqlx::query(
            "SELECT 1 FROM information_schema.statistics \
             WHERE table_schema = DATABASE() \
               AND table_name = 'search_entries' \
               AND index_name = 'search_entries_fulltext' \
             LIMIT 1",
        )
        .fetch_optional(pool)
        .await
        .map_err(|e| SearchError::Backend(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn do_install(&self, pool: &AnyPool) -> Result<(), SearchError> {
        // MyISAM has no foreign key support; constraints referencing the
        // entries table block the engine conversion and must go first.
        for (table, constraint) in referencing_foreign_keys(pool).await? {
            sqlx::query(&format!(
                "ALTER TABLE {table} DROP FOREIGN KEY {constraint}"
            ))
            .execute(pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
            debug!(table, constraint, "dropped foreign key onto search_entries");
        }
        let statements = [
            "ALTER TABLE search_entries ENGINE = MyISAM".to_string(),
            format!(
                "CREATE FULLTEXT INDEX {COMPOSITE_INDEX} \
                 ON search_entries (title, description, content)"
            ),
            format!("CREATE FULLTEXT INDEX {COMPOSITE_INDEX}_title ON search_entries (title)"),
            format!(
                "CREATE FULLTEXT INDEX {COMPOSITE_INDEX}_description \
                 ON search_entries (description)"
            ),
            format!(
                "CREATE FULLTEXT INDEX {COMPOSITE_INDEX}_content ON search_entries (content)"
            ),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| SearchError::Backend(e.to_string()))?;
        }
        debug!("installed mysql fulltext search support");
        Ok(())
    }

    async fn do_uninstall(&self, pool: &AnyPool) -> Result<(), SearchError> {
        let statements = [
            format!("DROP INDEX {COMPOSITE_INDEX} ON search_entries"),
            format!("DROP INDEX {COMPOSITE_INDEX}_title ON search_entries"),
            format!("DROP INDEX {COMPOSITE_INDEX}_description ON search_entries"),
            format!("DROP INDEX {COMPOSITE_INDEX}_content ON search_entries"),
        ];
        for statement in &statements {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| SearchError::Backend(e.to_string()))?;
        }
        debug!("removed mysql fulltext search support");
        Ok(())
    }

    fn do_search(&self, search_text: &str) -> SqlFragment {
        Self::match_fragment(search_text)
    }

    fn do_search_ranking(&self, search_text: &str) -> SqlFragment {
        Self::rank_fragment(search_text)
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
            _ => format!("search_entries.object_id = CAST({pk_column} AS CHAR)"),
        };
        let matched = Self::match_fragment(search_text);
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
        Self::rank_fragment(search_text)
    }
}

/// (table, constraint) pairs for every foreign key pointing at
/// `search_entries` in the current schema.
async fn referencing_foreign_keys(pool: &AnyPool) -> Result<Vec<(String, String)>, SearchError> {
    let rows = sqlx::query(
        "SELECT table_name, constraint_name \
         FROM information_schema.referential_constraints \
         WHERE constraint_schema = DATABASE() \
           AND referenced_table_name = 'search_entries'",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| SearchError::Backend(e.to_string()))?;
    let mut keys = Vec::with_capacity(rows.len());
    for row in rows {
        keys.push((
            identifier_col(&row, "table_name")?,
            identifier_col(&row, "constraint_name")?,
        ));
    }
    Ok(keys)
}

// information_schema identifiers surface as TEXT or BLOB depending on the
// server, like any other text column under the Any driver.
fn identifier_col(row: &sqlx::any::AnyRow, name: &str) -> Result<String, SearchError> {
    if let Ok(value) = row.try_get::<String, _>(name) {
        return Ok(value);
    }
    let bytes = row
        .try_get::<Vec<u8>, _>(name)
        .map_err(|e| SearchError::Backend(e.to_string()))?;
    String::from_utf8(bytes)
        .map_err(|e| SearchError::Backend(format!("non-utf8 identifier in {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_required_prefix_terms() {
        assert_eq!(
            MySqlSearchBackend::boolean_query("hello world").unwrap(),
            "+hello* +world*"
        );
    }

    #[test]
    fn happy_operators_stripped() {
        assert_eq!(
            MySqlSearchBackend::boolean_query("+rust* -go \"quoted\" @a").unwrap(),
            "+rust* +go* +quoted* +a*"
        );
        assert!(MySqlSearchBackend::boolean_query("+-~*").is_none());
    }

    #[test]
    fn happy_search_fragment_binds_query() {
        let frag = MySqlSearchBackend.do_search("rust");
        assert!(frag.sql.contains("AGAINST (? IN BOOLEAN MODE)"));
        assert_eq!(frag.params, vec![SqlParam::Text("+rust*".into())]);
    }

    #[test]
    fn happy_rank_weights_title_over_content() {
        let frag = MySqlSearchBackend.do_search_ranking("rust");
        assert!(frag.sql.contains("search_entries.title) AGAINST (? IN BOOLEAN MODE)) * 3"));
        assert!(frag.sql.contains("search_entries.content) AGAINST (? IN BOOLEAN MODE)) * 1"));
        assert_eq!(frag.params.len(), 3);
    }

    #[test]
    fn happy_filter_uses_char_cast_for_text_pks() {
        use crate::model::PkKind;
        static PAGE: ModelDescriptor = ModelDescriptor {
            content_type: "cms.page",
            db_table: "pages",
            pk_column: "slug",
            pk_kind: PkKind::Text,
            text_fields: &["body"],
        };
        let frag = MySqlSearchBackend.do_filter("default", &PAGE, "x");
        assert!(frag
            .sql
            .contains("search_entries.object_id = CAST(pages.slug AS CHAR)"));
    }
}
