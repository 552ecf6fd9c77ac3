// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL persistence for index entries.
//!
//! One `search_entries` table holds every indexed object across all engines
//! and models:
//! ```sql
//! CREATE TABLE search_entries (
//!   id            BIGINT PRIMARY KEY,   -- auto-increment
//!   engine_slug   VARCHAR(200) NOT NULL, -- indexed
//!   content_type  VARCHAR(100) NOT NULL,
//!   object_id     TEXT NOT NULL,         -- universal key form
//!   object_id_int BIGINT NULL,           -- indexed, int-keyed models only
//!   title         VARCHAR(1000) NOT NULL,
//!   description   TEXT NOT NULL,
//!   content       TEXT NOT NULL,
//!   url           TEXT NOT NULL,
//!   meta_encoded  TEXT NOT NULL          -- stored fields, JSON
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver treats TEXT columns as BLOB on some servers (read as
//! `Vec<u8>`, then converted), and passes SQL through verbatim, so `?`
//! placeholders must be rewritten to `$n` form for PostgreSQL before
//! execution.

use std::sync::{Arc, Once, OnceLock};
use std::time::Duration;

use sqlx::{any::AnyPoolOptions, AnyPool, Row};
use tracing::debug;

use crate::backend::{backend_for, Dialect, SearchBackend, SqlFragment, SqlParam};
use crate::config::SearchConfig;
use crate::entry::{EntryData, FilterHit, NewSearchEntry, SearchEntry};
use crate::error::SearchError;
use crate::model::{ModelDescriptor, PkKind, PrimaryKey};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

// `rank` itself is reserved in MySQL 8.0.2+ (window functions), so the
// relevance column needs a distinct alias.
const RANK_ALIAS: &str = "search_rank";

const ENTRY_COLUMNS: &str = "search_entries.id, search_entries.engine_slug, \
     search_entries.content_type, search_entries.object_id, \
     search_entries.object_id_int, search_entries.title, \
     search_entries.description, search_entries.content, \
     search_entries.url, search_entries.meta_encoded";

/// Shared handle to the search database.
///
/// Owns the connection pool, the schema, and the lazily selected match
/// backend. Engines compose fragments; the store turns them into complete
/// statements and executes them.
pub struct SearchStore {
    pool: AnyPool,
    dialect: Dialect,
    config: SearchConfig,
    backend: OnceLock<Arc<dyn SearchBackend>>,
}

impl SearchStore {
    /// Connect using `config.database_url`.
    pub async fn connect(config: SearchConfig) -> Result<Arc<Self>, SearchError> {
        let url = config.database_url.clone().ok_or_else(|| {
            SearchError::Backend("no database_url configured".to_string())
        })?;
        Self::new(&url, config).await
    }

    /// Connect to an explicit URL, create the entry schema if missing.
    pub async fn new(url: &str, config: SearchConfig) -> Result<Arc<Self>, SearchError> {
        install_drivers();

        let dialect = Dialect::from_url(url)?;

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let store = Arc::new(Self {
            pool,
            dialect,
            config,
            backend: OnceLock::new(),
        });

        // WAL mode for SQLite (concurrent reads during writes)
        if store.dialect == Dialect::Sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// The active match backend. Selected on first access so a store can be
    /// constructed before anything is searched, and cached for the life of
    /// the store.
    pub fn backend(&self) -> Arc<dyn SearchBackend> {
        self.backend
            .get_or_init(|| {
                backend_for(
                    self.config.backend,
                    self.dialect,
                    &self.config.postgres_search_config,
                )
            })
            .clone()
    }

    async fn enable_wal_mode(&self) -> Result<(), SearchError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(format!("Failed to enable WAL mode: {e}")))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(format!("Failed to set synchronous mode: {e}")))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), SearchError> {
        let mut statements: Vec<&str> = Vec::new();
        match self.dialect {
            Dialect::Sqlite => {
                statements.push(
                    "CREATE TABLE IF NOT EXISTS search_entries (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        engine_slug TEXT NOT NULL DEFAULT 'default',
                        content_type TEXT NOT NULL,
                        object_id TEXT NOT NULL,
                        object_id_int INTEGER,
                        title TEXT NOT NULL,
                        description TEXT NOT NULL DEFAULT '',
                        content TEXT NOT NULL DEFAULT '',
                        url TEXT NOT NULL DEFAULT '',
                        meta_encoded TEXT NOT NULL DEFAULT '{}'
                    )",
                );
                statements.push(
                    "CREATE INDEX IF NOT EXISTS search_entries_engine_slug \
                     ON search_entries (engine_slug)",
                );
                statements.push(
                    "CREATE INDEX IF NOT EXISTS search_entries_object_id_int \
                     ON search_entries (object_id_int)",
                );
            }
            Dialect::Postgres => {
                statements.push(
                    "CREATE TABLE IF NOT EXISTS search_entries (
                        id BIGSERIAL PRIMARY KEY,
                        engine_slug VARCHAR(200) NOT NULL DEFAULT 'default',
                        content_type VARCHAR(100) NOT NULL,
                        object_id TEXT NOT NULL,
                        object_id_int BIGINT,
                        title VARCHAR(1000) NOT NULL,
                        description TEXT NOT NULL DEFAULT '',
                        content TEXT NOT NULL DEFAULT '',
                        url VARCHAR(1000) NOT NULL DEFAULT '',
                        meta_encoded TEXT NOT NULL DEFAULT '{}'
                    )",
                );
                statements.push(
                    "CREATE INDEX IF NOT EXISTS search_entries_engine_slug \
                     ON search_entries (engine_slug)",
                );
                statements.push(
                    "CREATE INDEX IF NOT EXISTS search_entries_object_id_int \
                     ON search_entries (object_id_int)",
                );
            }
            Dialect::MySql => {
                // MySQL has no IF NOT EXISTS for indexes, so they ride along
                // inside the table definition.
                statements.push(
                    "CREATE TABLE IF NOT EXISTS search_entries (
                        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                        engine_slug VARCHAR(200) NOT NULL DEFAULT 'default',
                        content_type VARCHAR(100) NOT NULL,
                        object_id TEXT NOT NULL,
                        object_id_int BIGINT NULL,
                        title VARCHAR(1000) NOT NULL,
                        description LONGTEXT NOT NULL,
                        content LONGTEXT NOT NULL,
                        url VARCHAR(1000) NOT NULL,
                        meta_encoded LONGTEXT NOT NULL,
                        INDEX search_entries_engine_slug (engine_slug),
                        INDEX search_entries_object_id_int (object_id_int)
                    )",
                );
            }
        }
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| SearchError::Backend(e.to_string()))?;
        }
        debug!(dialect = ?self.dialect, "search entry schema ready");
        Ok(())
    }

    /// Rewrite `?` placeholders to `$n` for PostgreSQL; the Any driver
    /// passes statements through verbatim. Skips quoted literals.
    fn finalize(&self, sql: &str) -> String {
        if self.dialect == Dialect::Postgres {
            number_placeholders(sql)
        } else {
            sql.to_string()
        }
    }

    /// Update all entries for one object in place. The affected-row count
    /// is driver-dependent (MySQL counts changed rows, not matched rows),
    /// so existence checks go through `entry_ids_for_object` instead.
    pub async fn update_entries(
        &self,
        engine_slug: &str,
        model: &ModelDescriptor,
        object_id: &str,
        object_id_int: Option<i64>,
        data: &EntryData,
    ) -> Result<u64, SearchError> {
        let id_condition = match object_id_int {
            Some(_) => "search_entries.object_id_int = ?",
            None => "search_entries.object_id = ?",
        };
        let sql = self.finalize(&format!(
            "UPDATE search_entries \
             SET title = ?, description = ?, content = ?, url = ?, meta_encoded = ? \
             WHERE engine_slug = ? AND content_type = ? AND {id_condition}"
        ));
        let mut query = sqlx::query(&sql)
            .bind(data.title.clone())
            .bind(data.description.clone())
            .bind(data.content.clone())
            .bind(data.url.clone())
            .bind(data.meta_encoded.clone())
            .bind(engine_slug.to_string())
            .bind(model.content_type.to_string());
        query = match object_id_int {
            Some(v) => query.bind(v),
            None => query.bind(object_id.to_string()),
        };
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Entry ids for one object, oldest first.
    pub async fn entry_ids_for_object(
        &self,
        engine_slug: &str,
        model: &ModelDescriptor,
        object_id: &str,
        object_id_int: Option<i64>,
    ) -> Result<Vec<i64>, SearchError> {
        let id_condition = match object_id_int {
            Some(_) => "search_entries.object_id_int = ?",
            None => "search_entries.object_id = ?",
        };
        let sql = self.finalize(&format!(
            "SELECT id FROM search_entries \
             WHERE engine_slug = ? AND content_type = ? AND {id_condition} \
             ORDER BY id"
        ));
        let mut query = sqlx::query(&sql)
            .bind(engine_slug.to_string())
            .bind(model.content_type.to_string());
        query = match object_id_int {
            Some(v) => query.bind(v),
            None => query.bind(object_id.to_string()),
        };
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(
                row.try_get::<i64, _>("id")
                    .map_err(|e| SearchError::Backend(e.to_string()))?,
            );
        }
        Ok(ids)
    }

    /// Delete specific entries by id.
    pub async fn delete_entry_ids(&self, ids: &[i64]) -> Result<u64, SearchError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = self.finalize(&format!(
            "DELETE FROM search_entries WHERE id IN ({placeholders})"
        ));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Delete all entries for one object.
    pub async fn delete_entries_for_object(
        &self,
        engine_slug: &str,
        model: &ModelDescriptor,
        object_id: &str,
        object_id_int: Option<i64>,
    ) -> Result<u64, SearchError> {
        let id_condition = match object_id_int {
            Some(_) => "search_entries.object_id_int = ?",
            None => "search_entries.object_id = ?",
        };
        let sql = self.finalize(&format!(
            "DELETE FROM search_entries \
             WHERE engine_slug = ? AND content_type = ? AND {id_condition}"
        ));
        let mut query = sqlx::query(&sql)
            .bind(engine_slug.to_string())
            .bind(model.content_type.to_string());
        query = match object_id_int {
            Some(v) => query.bind(v),
            None => query.bind(object_id.to_string()),
        };
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Insert new entries as chunked multi-row statements inside one
    /// transaction. Chunking keeps each statement under server packet
    /// limits.
    pub async fn insert_entries(&self, entries: &[NewSearchEntry]) -> Result<usize, SearchError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        let mut written = 0usize;
        for chunk in entries.chunks(self.config.batch_size.max(1)) {
            let placeholders: Vec<String> = (0..chunk.len())
                .map(|_| "(?, ?, ?, ?, ?, ?, ?, ?, ?)".to_string())
                .collect();
            let sql = self.finalize(&format!(
                "INSERT INTO search_entries \
                 (engine_slug, content_type, object_id, object_id_int, \
                  title, description, content, url, meta_encoded) \
                 VALUES {}",
                placeholders.join(", ")
            ));
            let mut query = sqlx::query(&sql);
            for entry in chunk {
                query = query
                    .bind(entry.engine_slug.clone())
                    .bind(entry.content_type.clone())
                    .bind(entry.object_id.clone())
                    .bind(entry.object_id_int)
                    .bind(entry.data.title.clone())
                    .bind(entry.data.description.clone())
                    .bind(entry.data.content.clone())
                    .bind(entry.data.url.clone())
                    .bind(entry.data.meta_encoded.clone());
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(|e| SearchError::Backend(e.to_string()))?;
            written += chunk.len();
        }
        tx.commit()
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        debug!(written, "inserted search entries");
        Ok(written)
    }

    /// Delete entries whose content type is no longer registered with the
    /// engine. An empty `keep` list deletes every entry for the engine.
    pub async fn delete_stale_types(
        &self,
        engine_slug: &str,
        keep: &[&str],
    ) -> Result<u64, SearchError> {
        let sql = if keep.is_empty() {
            self.finalize("DELETE FROM search_entries WHERE engine_slug = ?")
        } else {
            let placeholders = vec!["?"; keep.len()].join(", ");
            self.finalize(&format!(
                "DELETE FROM search_entries \
                 WHERE engine_slug = ? AND content_type NOT IN ({placeholders})"
            ))
        };
        let mut query = sqlx::query(&sql).bind(engine_slug.to_string());
        for content_type in keep {
            query = query.bind(content_type.to_string());
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        Ok(result.rows_affected())
    }

    pub async fn count_entries(&self, engine_slug: &str) -> Result<u64, SearchError> {
        let sql = self.finalize(
            "SELECT COUNT(*) AS cnt FROM search_entries WHERE engine_slug = ?",
        );
        let row = sqlx::query(&sql)
            .bind(engine_slug.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        Ok(count as u64)
    }

    /// Execute a full search over entries. `model_filter` scopes by content
    /// type and object ids; the match condition comes from the backend.
    pub async fn search(
        &self,
        engine_slug: &str,
        model_filter: &SqlFragment,
        search_text: &str,
        ranking: bool,
    ) -> Result<Vec<SearchEntry>, SearchError> {
        let backend = self.backend();
        let matched = backend.do_search(search_text);
        let rank = if ranking {
            Some(backend.do_search_ranking(search_text))
        } else {
            None
        };

        let mut sql = format!("SELECT {ENTRY_COLUMNS}");
        let mut params: Vec<SqlParam> = Vec::new();
        if let Some(rank) = &rank {
            sql.push_str(&format!(", {} AS {RANK_ALIAS}", rank.sql));
            params.extend(rank.params.iter().cloned());
        }
        sql.push_str(&format!(
            " FROM search_entries \
             WHERE search_entries.engine_slug = ? AND ({}) AND ({})",
            model_filter.sql, matched.sql
        ));
        params.push(SqlParam::Text(engine_slug.to_string()));
        params.extend(model_filter.params.iter().cloned());
        params.extend(matched.params.iter().cloned());
        if ranking && backend.supports_ranking() {
            sql.push_str(&format!(" ORDER BY {RANK_ALIAS} DESC"));
        }

        let sql = self.finalize(&sql);
        let rows = bind_params(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row
                .try_get("id")
                .map_err(|e| SearchError::Backend(e.to_string()))?;
            let object_id_int = row
                .try_get::<Option<i64>, _>("object_id_int")
                .ok()
                .flatten();
            let rank_value = if rank.is_some() { rank_col(&row) } else { None };
            entries.push(SearchEntry::new(
                id,
                text_col(&row, "engine_slug"),
                text_col(&row, "content_type"),
                text_col(&row, "object_id"),
                object_id_int,
                text_col(&row, "title"),
                text_col(&row, "description"),
                text_col(&row, "content"),
                text_col(&row, "url"),
                text_col(&row, "meta_encoded"),
                rank_value,
            ));
        }
        Ok(entries)
    }

    /// Primary keys of all rows in a model's table, for blank-text filters.
    pub async fn model_pks(&self, model: &ModelDescriptor) -> Result<Vec<FilterHit>, SearchError> {
        let sql = format!("SELECT {} AS pk FROM {}", self.pk_select(model), model.db_table);
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            hits.push(FilterHit {
                pk: decode_pk(&row, model.pk_kind)?,
                rank: None,
            });
        }
        Ok(hits)
    }

    /// Model-scoped filter: which rows of `model`'s own table match
    /// `search_text`, joined through their index entries.
    pub async fn filter(
        &self,
        engine_slug: &str,
        model: &ModelDescriptor,
        search_text: &str,
        ranking: bool,
    ) -> Result<Vec<FilterHit>, SearchError> {
        let backend = self.backend();
        let condition = backend.do_filter(engine_slug, model, search_text);
        let rank = if ranking {
            Some(backend.do_filter_ranking(model, search_text))
        } else {
            None
        };

        let mut sql = format!("SELECT {} AS pk", self.pk_select(model));
        let mut params: Vec<SqlParam> = Vec::new();
        if let Some(rank) = &rank {
            sql.push_str(&format!(", {} AS {RANK_ALIAS}", rank.sql));
            params.extend(rank.params.iter().cloned());
        }
        sql.push_str(&format!(
            " FROM {}, search_entries WHERE {}",
            model.db_table, condition.sql
        ));
        params.extend(condition.params.iter().cloned());
        if ranking && backend.supports_ranking() {
            sql.push_str(&format!(" ORDER BY {RANK_ALIAS} DESC"));
        }

        let sql = self.finalize(&sql);
        let rows = bind_params(sqlx::query(&sql), &params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SearchError::Backend(e.to_string()))?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            hits.push(FilterHit {
                pk: decode_pk(&row, model.pk_kind)?,
                rank: if rank.is_some() { rank_col(&row) } else { None },
            });
        }
        Ok(hits)
    }

    fn pk_select(&self, model: &ModelDescriptor) -> String {
        let column = format!("{}.{}", model.db_table, model.pk_column);
        match (self.dialect, model.pk_kind) {
            // Native uuid columns don't decode through the Any driver;
            // select the text form instead.
            (Dialect::Postgres, PkKind::Uuid) => format!("{column}::text"),
            _ => column,
        }
    }
}

fn bind_params<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>>,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, sqlx::Any, sqlx::any::AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind(v.clone()),
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Float(v) => query.bind(*v),
        };
    }
    query
}

/// Read a text column, tolerating servers where TEXT surfaces as bytes.
fn text_col(row: &sqlx::any::AnyRow, name: &str) -> String {
    if let Ok(value) = row.try_get::<String, _>(name) {
        return value;
    }
    row.try_get::<Vec<u8>, _>(name)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_default()
}

/// Rank expressions come back as double, real or integer depending on the
/// backend and expression shape.
fn rank_col(row: &sqlx::any::AnyRow) -> Option<f64> {
    if let Ok(value) = row.try_get::<f64, _>(RANK_ALIAS) {
        return Some(value);
    }
    if let Ok(value) = row.try_get::<f32, _>(RANK_ALIAS) {
        return Some(value as f64);
    }
    row.try_get::<i64, _>(RANK_ALIAS).ok().map(|v| v as f64)
}

fn decode_pk(row: &sqlx::any::AnyRow, kind: PkKind) -> Result<PrimaryKey, SearchError> {
    match kind {
        PkKind::Int | PkKind::BigInt => {
            let value: i64 = row
                .try_get("pk")
                .map_err(|e| SearchError::Backend(e.to_string()))?;
            Ok(PrimaryKey::Int(value))
        }
        PkKind::Uuid => {
            let text = text_col(row, "pk");
            let parsed = text
                .parse()
                .map_err(|e| SearchError::Backend(format!("bad uuid key `{text}`: {e}")))?;
            Ok(PrimaryKey::Uuid(parsed))
        }
        PkKind::Text => Ok(PrimaryKey::Text(text_col(row, "pk"))),
    }
}

/// `?` → `$1 $2 ...`, leaving quoted literals untouched.
fn number_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0usize;
    let mut quote: Option<char> = None;
    for ch in sql.chars() {
        match quote {
            Some(q) => {
                out.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    out.push(ch);
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(ch),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_placeholder_numbering() {
        assert_eq!(
            number_placeholders("SELECT ? WHERE a = ? AND b = ?"),
            "SELECT $1 WHERE a = $2 AND b = $3"
        );
        assert_eq!(number_placeholders("no params"), "no params");
    }

    #[test]
    fn happy_placeholder_numbering_skips_literals() {
        assert_eq!(
            number_placeholders("SELECT '?' , \"q?\" , ? FROM t"),
            "SELECT '?' , \"q?\" , $1 FROM t"
        );
        assert_eq!(
            number_placeholders("LIKE ? ESCAPE '!' OR x = ?"),
            "LIKE $1 ESCAPE '!' OR x = $2"
        );
    }

    mod sqlite {
        use super::super::*;
        use crate::model::PkKind;

        static NOTE: ModelDescriptor = ModelDescriptor {
            content_type: "test.note",
            db_table: "notes",
            pk_column: "id",
            pk_kind: PkKind::Int,
            text_fields: &["body"],
        };

        async fn temp_store() -> (tempfile::TempDir, Arc<SearchStore>) {
            let dir = tempfile::tempdir().unwrap();
            let url = format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("search.db").display()
            );
            let store = SearchStore::new(&url, SearchConfig::default()).await.unwrap();
            (dir, store)
        }

        fn note_entry(id: i64, title: &str, content: &str) -> NewSearchEntry {
            NewSearchEntry {
                engine_slug: "default".into(),
                content_type: NOTE.content_type.into(),
                object_id: id.to_string(),
                object_id_int: Some(id),
                data: EntryData {
                    title: title.into(),
                    description: String::new(),
                    content: content.into(),
                    url: String::new(),
                    meta_encoded: "{}".into(),
                },
            }
        }

        #[tokio::test]
        async fn happy_schema_init_is_idempotent() {
            let (_dir, store) = temp_store().await;
            store.init_schema().await.unwrap();
            assert_eq!(store.count_entries("default").await.unwrap(), 0);
        }

        #[tokio::test]
        async fn happy_insert_update_delete_cycle() {
            let (_dir, store) = temp_store().await;
            let inserted = store
                .insert_entries(&[note_entry(1, "First", "alpha"), note_entry(2, "Second", "beta")])
                .await
                .unwrap();
            assert_eq!(inserted, 2);
            assert_eq!(store.count_entries("default").await.unwrap(), 2);

            let data = EntryData {
                title: "First revised".into(),
                content: "gamma".into(),
                meta_encoded: "{}".into(),
                ..Default::default()
            };
            let touched = store
                .update_entries("default", &NOTE, "1", Some(1), &data)
                .await
                .unwrap();
            assert_eq!(touched, 1);

            let deleted = store
                .delete_entries_for_object("default", &NOTE, "2", Some(2))
                .await
                .unwrap();
            assert_eq!(deleted, 1);
            assert_eq!(store.count_entries("default").await.unwrap(), 1);
        }

        #[tokio::test]
        async fn happy_search_matches_prefix_case_insensitively() {
            let (_dir, store) = temp_store().await;
            store
                .insert_entries(&[
                    note_entry(1, "Grocery list", "apples and pears"),
                    note_entry(2, "TODO", "call the plumber"),
                ])
                .await
                .unwrap();
            let hits = store
                .search("default", &SqlFragment::always(), "GROC", false)
                .await
                .unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].title, "Grocery list");
            assert_eq!(hits[0].object_id_int, Some(1));
            assert!(hits[0].rank.is_none());
        }

        #[tokio::test]
        async fn happy_ranked_search_carries_rank_column() {
            let (_dir, store) = temp_store().await;
            store
                .insert_entries(&[note_entry(1, "Ranked note", "some text")])
                .await
                .unwrap();
            let hits = store
                .search("default", &SqlFragment::always(), "ranked", true)
                .await
                .unwrap();
            assert_eq!(hits.len(), 1);
            // The aliased relevance expression decodes back onto the entry.
            // The alias must not collide with reserved words on any dialect.
            assert_eq!(hits[0].rank, Some(1.0));
            assert_ne!(RANK_ALIAS.to_ascii_lowercase(), "rank");
        }

        #[tokio::test]
        async fn happy_stale_type_cleanup() {
            let (_dir, store) = temp_store().await;
            let mut other = note_entry(9, "Old", "stale");
            other.content_type = "test.retired".into();
            store
                .insert_entries(&[note_entry(1, "Live", "fresh"), other])
                .await
                .unwrap();
            let deleted = store
                .delete_stale_types("default", &[NOTE.content_type])
                .await
                .unwrap();
            assert_eq!(deleted, 1);
            assert_eq!(store.count_entries("default").await.unwrap(), 1);
        }

        #[tokio::test]
        async fn happy_duplicate_ids_ordered_then_pruned() {
            let (_dir, store) = temp_store().await;
            store
                .insert_entries(&[
                    note_entry(5, "Dup A", "one"),
                    note_entry(5, "Dup B", "two"),
                    note_entry(5, "Dup C", "three"),
                ])
                .await
                .unwrap();
            let ids = store
                .entry_ids_for_object("default", &NOTE, "5", Some(5))
                .await
                .unwrap();
            assert_eq!(ids.len(), 3);
            assert!(ids.windows(2).all(|w| w[0] < w[1]));

            let pruned = store.delete_entry_ids(&ids[1..]).await.unwrap();
            assert_eq!(pruned, 2);
            assert_eq!(store.count_entries("default").await.unwrap(), 1);
        }
    }
}
