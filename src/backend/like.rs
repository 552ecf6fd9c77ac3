// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Portable fallback backend built on `LIKE`.
//!
//! Works on every supported database with no installation step. Each query
//! word must match the start of some word in the title, description or
//! content of an entry; words are matched case-insensitively and as
//! prefixes, and all query words must match (conjunction).

use crate::backend::{Dialect, SearchBackend, SqlFragment, SqlParam};
use crate::model::{ModelDescriptor, PkKind};

const ENTRY_TEXT_COLUMNS: [&str; 3] = [
    "search_entries.title",
    "search_entries.description",
    "search_entries.content",
];

pub struct LikeSearchBackend {
    dialect: Dialect,
}

impl LikeSearchBackend {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Cast a model primary key column to text for comparison against the
    /// entry `object_id` column.
    fn text_cast(&self, column: &str) -> String {
        match self.dialect {
            Dialect::Sqlite => format!("CAST({column} AS TEXT)"),
            Dialect::MySql => format!("CAST({column} AS CHAR)"),
            Dialect::Postgres => format!("{column}::text"),
        }
    }

    fn match_fragment(&self, search_text: &str) -> SqlFragment {
        let words: Vec<String> = search_text
            .split_whitespace()
            .map(|w| escape_like(&w.to_lowercase()))
            .collect();
        if words.is_empty() {
            return SqlFragment::never();
        }
        let mut clauses = Vec::with_capacity(words.len());
        let mut params = Vec::new();
        for word in &words {
            let mut alternates = Vec::with_capacity(ENTRY_TEXT_COLUMNS.len() * 3);
            for column in ENTRY_TEXT_COLUMNS {
                for pattern in word_patterns(word) {
                    alternates.push(format!("LOWER({column}) LIKE ? ESCAPE '!'"));
                    params.push(SqlParam::Text(pattern));
                }
            }
            clauses.push(format!("({})", alternates.join(" OR ")));
        }
        SqlFragment::with_params(clauses.join(" AND "), params)
    }
}

/// Patterns that match `word` at the start of the field or at the start of
/// any later word. The newline variant catches words opening a new line,
/// which the space variant misses.
fn word_patterns(escaped_word: &str) -> [String; 3] {
    [
        format!("{escaped_word}%"),
        format!("% {escaped_word}%"),
        format!("%\n{escaped_word}%"),
    ]
}

/// Escape `LIKE` wildcards with `!` so user text matches literally.
fn escape_like(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for ch in word.chars() {
        if matches!(ch, '%' | '_' | '!') {
            out.push('!');
        }
        out.push(ch);
    }
    out
}

#[async_trait::async_trait]
impl SearchBackend for LikeSearchBackend {
    fn supports_prefix_matching(&self) -> bool {
        true
    }

    fn do_search(&self, search_text: &str) -> SqlFragment {
        self.match_fragment(search_text)
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
            _ => format!("search_entries.object_id = {}", self.text_cast(&pk_column)),
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> LikeSearchBackend {
        LikeSearchBackend::new(Dialect::Sqlite)
    }

    #[test]
    fn happy_single_word_patterns() {
        let frag = backend().do_search("Rust");
        // One alternative per column per pattern variant.
        assert_eq!(frag.sql.matches("LIKE ? ESCAPE '!'").count(), 9);
        assert_eq!(frag.params.len(), 9);
        assert_eq!(frag.params[0], SqlParam::Text("rust%".into()));
        assert_eq!(frag.params[1], SqlParam::Text("% rust%".into()));
        assert_eq!(frag.params[2], SqlParam::Text("%\nrust%".into()));
        assert!(frag.sql.contains("LOWER(search_entries.title)"));
        assert!(frag.sql.contains("LOWER(search_entries.content)"));
    }

    #[test]
    fn happy_multi_word_is_conjunctive() {
        let frag = backend().do_search("hello world");
        assert_eq!(frag.sql.matches(" AND ").count(), 1);
        assert_eq!(frag.params.len(), 18);
    }

    #[test]
    fn happy_wildcards_escaped() {
        let frag = backend().do_search("100%_done!");
        assert_eq!(frag.params[0], SqlParam::Text("100!%!_done!!%".into()));
    }

    #[test]
    fn happy_filter_join_by_pk_kind() {
        use crate::model::PkKind;
        static INT_MODEL: ModelDescriptor = ModelDescriptor {
            content_type: "app.item",
            db_table: "items",
            pk_column: "id",
            pk_kind: PkKind::Int,
            text_fields: &["name"],
        };
        static TEXT_MODEL: ModelDescriptor = ModelDescriptor {
            content_type: "app.page",
            db_table: "pages",
            pk_column: "slug",
            pk_kind: PkKind::Text,
            text_fields: &["body"],
        };
        let frag = backend().do_filter("default", &INT_MODEL, "x");
        assert!(frag.sql.contains("search_entries.object_id_int = items.id"));
        assert_eq!(frag.params[0], SqlParam::Text("default".into()));
        assert_eq!(frag.params[1], SqlParam::Text("app.item".into()));

        let frag = backend().do_filter("default", &TEXT_MODEL, "x");
        assert!(frag
            .sql
            .contains("search_entries.object_id = CAST(pages.slug AS TEXT)"));
    }

    #[test]
    fn happy_blank_text_matches_nothing() {
        assert_eq!(backend().do_search("   "), SqlFragment::never());
    }
}
