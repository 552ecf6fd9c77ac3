//! Property-based tests (fuzzing) for query-text handling.
//!
//! Arbitrary user text must never produce invalid SQL, mismatched bind
//! parameters, or query-language injection; searches over hostile input
//! return clean results or clean errors, never panics.
//!
//! Run with: `cargo test --test proptest_fuzz`

use std::sync::{Arc, OnceLock};

use proptest::prelude::*;
use tempfile::TempDir;
use tokio::runtime::Runtime;

use sleuth::{
    AdapterConfig, Dialect, FieldValue, LikeSearchBackend, ModelDescriptor, ModelRegistration,
    MySqlSearchBackend, PkKind, PostgresSearchBackend, PrimaryKey, SearchBackend, SearchConfig,
    SearchEngine, SearchStore, Searchable, SqlParam,
};

static NOTE: ModelDescriptor = ModelDescriptor {
    content_type: "fuzz.note",
    db_table: "notes",
    pk_column: "id",
    pk_kind: PkKind::Int,
    text_fields: &["body"],
};

struct Note {
    id: i64,
    body: String,
}

impl Searchable for Note {
    fn descriptor(&self) -> &'static ModelDescriptor {
        &NOTE
    }
    fn pk(&self) -> PrimaryKey {
        PrimaryKey::Int(self.id)
    }
    fn display(&self) -> String {
        format!("note {}", self.id)
    }
    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "body" => Some(FieldValue::Text(self.body.clone())),
            _ => None,
        }
    }
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();
static SHARED: OnceLock<(TempDir, Arc<SearchEngine>)> = OnceLock::new();

fn rt() -> &'static Runtime {
    RUNTIME.get_or_init(|| Runtime::new().unwrap())
}

/// One SQLite-backed engine with a couple of indexed notes, shared by every
/// fuzz case.
fn shared_engine() -> &'static Arc<SearchEngine> {
    let (_dir, engine) = SHARED.get_or_init(|| {
        rt().block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let url = format!(
                "sqlite://{}?mode=rwc",
                dir.path().join("fuzz.db").display()
            );
            let store = SearchStore::new(&url, SearchConfig::default()).await.unwrap();
            sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
                .execute(store.pool())
                .await
                .unwrap();
            let engine = SearchEngine::new("fuzz", store).unwrap();
            engine
                .register(ModelRegistration {
                    descriptor: &NOTE,
                    adapter: AdapterConfig::default(),
                    loader: Arc::new(Vec::new),
                })
                .unwrap();
            for (id, body) in [(1, "alpha beta gamma"), (2, "100% _literal_ text!")] {
                sqlx::query("INSERT INTO notes (id, body) VALUES (?, ?)")
                    .bind(id)
                    .bind(body)
                    .execute(engine.store().pool())
                    .await
                    .unwrap();
                engine
                    .update_obj_index(&Note {
                        id,
                        body: body.into(),
                    })
                    .await
                    .unwrap();
            }
            (dir, engine)
        })
    });
    engine
}

/// `?` placeholders outside quoted literals.
fn placeholder_count(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;
    for ch in sql.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '?' => count += 1,
                _ => {}
            },
        }
    }
    count
}

fn text_param(param: &SqlParam) -> &str {
    match param {
        SqlParam::Text(s) => s,
        other => panic!("expected text param, got {other:?}"),
    }
}

proptest! {
    /// Every backend keeps placeholders and bind parameters aligned for
    /// arbitrary search text.
    #[test]
    fn fuzz_fragment_params_align(text in ".{0,120}") {
        let backends: [Box<dyn SearchBackend>; 3] = [
            Box::new(LikeSearchBackend::new(Dialect::Sqlite)),
            Box::new(PostgresSearchBackend::new("pg_catalog.english")),
            Box::new(MySqlSearchBackend),
        ];
        for backend in &backends {
            let frag = backend.do_search(&text);
            prop_assert_eq!(placeholder_count(&frag.sql), frag.params.len());
            let frag = backend.do_filter("fuzz", &NOTE, &text);
            prop_assert_eq!(placeholder_count(&frag.sql), frag.params.len());
            let frag = backend.do_search_ranking(&text);
            prop_assert_eq!(placeholder_count(&frag.sql), frag.params.len());
        }
    }

    /// Generated tsqueries are always well-formed conjunctive prefix terms
    /// whose lexemes cannot escape their quoting.
    #[test]
    fn fuzz_postgres_tsquery_shape(text in ".{0,120}") {
        let backend = PostgresSearchBackend::new("pg_catalog.english");
        let frag = backend.do_search(&text);
        if let Some(param) = frag.params.first() {
            let query = text_param(param);
            for term in query.split(" & ") {
                prop_assert!(term.starts_with('\''), "term `{term}`");
                prop_assert!(term.ends_with("':*"), "term `{term}`");
                let lexeme = &term[1..term.len() - 3];
                prop_assert!(!lexeme.is_empty());
                prop_assert!(!lexeme.contains('\''));
                prop_assert!(!lexeme.contains('\\'));
                prop_assert!(!lexeme.contains(|c: char| "&:(|)!><".contains(c)));
            }
        } else {
            // No parameters means the unmatchable constant condition.
            prop_assert_eq!(frag.sql.as_str(), "1 = 0");
        }
    }

    /// Boolean-mode queries contain only required prefix terms with the
    /// operator characters stripped.
    #[test]
    fn fuzz_mysql_boolean_query_shape(text in ".{0,120}") {
        let frag = MySqlSearchBackend.do_search(&text);
        if let Some(param) = frag.params.first() {
            let query = text_param(param);
            for term in query.split(' ') {
                prop_assert!(term.starts_with('+'), "term `{term}`");
                prop_assert!(term.ends_with('*'), "term `{term}`");
                let word = &term[1..term.len() - 1];
                prop_assert!(!word.is_empty());
                prop_assert!(!word.contains(|c: char| "\"()><~*+-@".contains(c)));
            }
        }
    }

    /// LIKE patterns escape wildcards so they only match literally.
    #[test]
    fn fuzz_like_patterns_escaped(word in "[^\\s]{1,40}") {
        let frag = LikeSearchBackend::new(Dialect::Sqlite).do_search(&word);
        prop_assert_eq!(frag.params.len(), 9);
        for param in &frag.params {
            let pattern = text_param(param);
            // Wildcards are either escaped by `!` or part of the pattern
            // scaffolding we append/prepend.
            let core = pattern
                .trim_end_matches('%')
                .trim_start_matches('%')
                .trim_start_matches([' ', '\n']);
            let mut chars = core.chars().peekable();
            while let Some(ch) = chars.next() {
                if ch == '!' {
                    // Escape consumes the next character.
                    chars.next();
                } else {
                    prop_assert!(ch != '%' && ch != '_', "unescaped wildcard in `{pattern}`");
                }
            }
        }
    }

    /// Searching arbitrary text against a real store neither panics nor
    /// errors.
    #[test]
    fn fuzz_search_is_total(text in ".{0,100}") {
        let engine = shared_engine();
        let result = rt().block_on(engine.search(&text));
        prop_assert!(result.is_ok(), "search failed: {result:?}");
    }

    /// Model-scoped filtering over arbitrary text is equally total.
    #[test]
    fn fuzz_filter_is_total(text in ".{0,100}") {
        let engine = shared_engine();
        let result = rt().block_on(engine.filter(&NOTE, &text));
        prop_assert!(result.is_ok(), "filter failed: {result:?}");
    }
}
