//! # Sleuth
//!
//! A pluggable full-text search indexing and query layer over a relational
//! database: multi-model search across heterogeneous record types without a
//! dedicated search server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Host Application                        │
//! │  • Implements Searchable on its record types               │
//! │  • Calls save/delete hooks at write sites                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SearchEngine                          │
//! │  • Named registry of models + adapters                     │
//! │  • search / filter / rebuild / install lifecycle           │
//! └─────────────────────────────────────────────────────────────┘
//!          │                                       │
//!          ▼                                       ▼
//! ┌──────────────────────────┐    ┌──────────────────────────────┐
//! │      SearchContext       │    │        SearchBackend         │
//! │  • Defers index writes   │    │  • LIKE / tsvector /         │
//! │    per unit of work      │    │    boolean fulltext          │
//! │  • Nesting + rollback    │    │  • Emits SQL fragments       │
//! └──────────────────────────┘    └──────────────────────────────┘
//!          │                                       │
//!          └───────────────────┬───────────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       SearchStore                           │
//! │  • One search_entries table (SQLite/PostgreSQL/MySQL)      │
//! │  • Batched multi-row inserts, in-place updates             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sleuth::{
//!     AdapterConfig, ModelRegistration, SearchConfig, SearchEngine, SearchStore,
//! };
//! # use sleuth::{FieldValue, ModelDescriptor, PkKind, PrimaryKey, Searchable};
//! # static ARTICLE: ModelDescriptor = ModelDescriptor {
//! #     content_type: "blog.article", db_table: "articles", pk_column: "id",
//! #     pk_kind: PkKind::Int, text_fields: &["title", "body"],
//! # };
//! # struct Article { id: i64, title: String, body: String }
//! # impl Searchable for Article {
//! #     fn descriptor(&self) -> &'static ModelDescriptor { &ARTICLE }
//! #     fn pk(&self) -> PrimaryKey { PrimaryKey::Int(self.id) }
//! #     fn display(&self) -> String { self.title.clone() }
//! #     fn field(&self, name: &str) -> Option<FieldValue> {
//! #         match name {
//! #             "title" => Some(FieldValue::Text(self.title.clone())),
//! #             "body" => Some(FieldValue::Text(self.body.clone())),
//! #             _ => None,
//! #         }
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sleuth::SearchError> {
//!     let store = SearchStore::connect(SearchConfig::for_url("sqlite:search.db?mode=rwc")).await?;
//!     let engine = SearchEngine::new("default", store)?;
//!
//!     engine.register(ModelRegistration {
//!         descriptor: &ARTICLE,
//!         adapter: AdapterConfig::default(),
//!         loader: Arc::new(Vec::new),
//!     })?;
//!
//!     let article = Article { id: 1, title: "Hello".into(), body: "world".into() };
//!     engine.update_obj_index(&article).await?;
//!
//!     for hit in engine.search("hello").await? {
//!         println!("{}: {}", hit.content_type, hit.title);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Adaptive Backends**: native PostgreSQL tsvector or MySQL boolean
//!   full-text where available, portable LIKE matching everywhere else
//! - **Deferred Indexing**: batch index writes per unit of work, with
//!   nesting and rollback-on-error
//! - **Multi-Engine**: independent named indexes sharing one table
//! - **Heterogeneous Keys**: integer, UUID and text primary keys
//! - **Stored Fields**: render results without touching source tables
//!
//! ## Configuration
//!
//! See [`SearchConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`engine`]: The [`SearchEngine`] registry and orchestrator
//! - [`context`]: The [`SearchContext`] deferred-update scopes
//! - [`backend`]: Match strategies per database flavor
//! - [`store`]: The `search_entries` table and query execution
//! - [`adapter`]: Field extraction from host objects
//! - [`model`]: The [`Searchable`] contract and key/descriptor types

pub mod adapter;
pub mod backend;
pub mod config;
pub mod context;
pub mod engine;
pub mod entry;
pub mod error;
pub mod model;
pub mod store;

pub use adapter::{AdapterConfig, ExtractFn, LiveIdsFn, SearchAdapter};
pub use backend::{
    BackendKind, Dialect, LikeSearchBackend, MySqlSearchBackend, PostgresSearchBackend,
    SearchBackend, SqlFragment, SqlParam,
};
pub use config::SearchConfig;
pub use context::SearchContext;
pub use engine::{
    ModelRegistration, ModelSelector, ObjectLoader, RegisteredModel, SearchEngine, SearchOptions,
};
pub use entry::{EntryData, FilterHit, NewSearchEntry, RebuildReport, SearchEntry};
pub use error::SearchError;
pub use model::{FieldValue, ModelDescriptor, PkKind, PrimaryKey, Searchable};
pub use store::SearchStore;
