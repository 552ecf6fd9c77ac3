// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The search engine: a named registry of searchable models over one store.
//!
//! Multiple engines can share a store; each keeps its own registrations and
//! sees only its own entries, which is how an application hosts independent
//! search indexes (site search vs. admin search) in one table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::adapter::{AdapterConfig, SearchAdapter};
use crate::backend::{SqlFragment, SqlParam};
use crate::entry::{EntryData, FilterHit, NewSearchEntry, RebuildReport, SearchEntry};
use crate::error::SearchError;
use crate::model::{ModelDescriptor, PkKind, PrimaryKey, Searchable};
use crate::store::SearchStore;

/// Produces the current objects of a model, used to rebuild its entries.
pub type ObjectLoader = Arc<dyn Fn() -> Vec<Arc<dyn Searchable>> + Send + Sync>;

// Engine slugs are process-global: entries are partitioned by slug, so two
// live engines with the same slug would silently share an index.
static CREATED_ENGINES: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Everything needed to register one model with an engine.
pub struct ModelRegistration {
    pub descriptor: &'static ModelDescriptor,
    pub adapter: AdapterConfig,
    pub loader: ObjectLoader,
}

/// A model as held by the engine registry.
pub struct RegisteredModel {
    pub descriptor: &'static ModelDescriptor,
    pub adapter: SearchAdapter,
    pub loader: ObjectLoader,
}

/// Scopes a search to whole models or to explicit subsets of them.
#[derive(Clone)]
pub enum ModelSelector {
    /// Every indexed object of the model (restricted by its live filter,
    /// if it has one).
    Model(&'static str),
    /// Only the named objects of the model.
    Subset(&'static str, Vec<PrimaryKey>),
}

/// Options for [`SearchEngine::search_with`].
#[derive(Clone)]
pub struct SearchOptions {
    /// Models to search. Empty means every registered model.
    pub models: Vec<ModelSelector>,
    /// Models to exclude. Exclusion wins over inclusion.
    pub exclude: Vec<ModelSelector>,
    /// Annotate and order results by relevance where the backend can.
    pub ranking: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            exclude: Vec::new(),
            ranking: true,
        }
    }
}

pub struct SearchEngine {
    slug: String,
    store: Arc<SearchStore>,
    registry: RwLock<HashMap<&'static str, Arc<RegisteredModel>>>,
}

impl SearchEngine {
    /// Create an engine named `slug` over `store`. The slug must be unique
    /// among live engines in the process.
    pub fn new(slug: &str, store: Arc<SearchStore>) -> Result<Arc<Self>, SearchError> {
        let mut created = CREATED_ENGINES.lock();
        if created.iter().any(|existing| existing == slug) {
            return Err(SearchError::Registration(format!(
                "an engine with slug `{slug}` already exists"
            )));
        }
        created.push(slug.to_string());
        drop(created);
        Ok(Arc::new(Self {
            slug: slug.to_string(),
            store,
            registry: RwLock::new(HashMap::new()),
        }))
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn store(&self) -> &Arc<SearchStore> {
        &self.store
    }

    /// Register a model. Each content type registers at most once per
    /// engine.
    pub fn register(&self, registration: ModelRegistration) -> Result<(), SearchError> {
        let content_type = registration.descriptor.content_type;
        let mut registry = self.registry.write();
        if registry.contains_key(content_type) {
            return Err(SearchError::Registration(format!(
                "{content_type} is already registered with engine `{}`",
                self.slug
            )));
        }
        let adapter = SearchAdapter::new(
            registration.descriptor,
            registration.adapter,
            self.store.config().title_max_chars,
        );
        registry.insert(
            content_type,
            Arc::new(RegisteredModel {
                descriptor: registration.descriptor,
                adapter,
                loader: registration.loader,
            }),
        );
        debug!(engine = %self.slug, content_type, "registered model");
        Ok(())
    }

    pub fn unregister(&self, content_type: &str) -> Result<(), SearchError> {
        if self.registry.write().remove(content_type).is_none() {
            return Err(SearchError::Registration(format!(
                "{content_type} is not registered with engine `{}`",
                self.slug
            )));
        }
        debug!(engine = %self.slug, content_type, "unregistered model");
        Ok(())
    }

    pub fn is_registered(&self, content_type: &str) -> bool {
        self.registry.read().contains_key(content_type)
    }

    /// Registered content types, sorted for stable iteration.
    pub fn registered_models(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.registry.read().keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn registration(&self, content_type: &str) -> Result<Arc<RegisteredModel>, SearchError> {
        self.registry.read().get(content_type).cloned().ok_or_else(|| {
            SearchError::Registration(format!(
                "{content_type} is not registered with engine `{}`",
                self.slug
            ))
        })
    }

    /// Extract entry data for `obj` and update its entries in place.
    /// Returns a pending insert when no entry exists yet, plus how many
    /// duplicate entries were repaired.
    async fn refresh_object(
        &self,
        obj: &dyn Searchable,
    ) -> Result<(Option<NewSearchEntry>, u64), SearchError> {
        let descriptor = obj.descriptor();
        let registered = self.registration(descriptor.content_type)?;
        let adapter = &registered.adapter;

        let data = EntryData {
            title: adapter.title(obj),
            description: adapter.description(obj),
            content: adapter.content(obj)?,
            url: adapter.url(obj),
            meta_encoded: adapter.serialize_meta(obj)?,
        };
        let object_id = obj.pk().as_text();
        let object_id_int = if descriptor.pk_kind.uses_int_column() {
            obj.pk().as_int()
        } else {
            None
        };

        // Look up ids rather than trusting UPDATE's affected-row count,
        // which MySQL reports as rows changed, not rows matched.
        let ids = self
            .store
            .entry_ids_for_object(&self.slug, descriptor, &object_id, object_id_int)
            .await?;
        if ids.is_empty() {
            return Ok((
                Some(NewSearchEntry {
                    engine_slug: self.slug.clone(),
                    content_type: descriptor.content_type.to_string(),
                    object_id,
                    object_id_int,
                    data,
                }),
                0,
            ));
        }
        self.store
            .update_entries(&self.slug, descriptor, &object_id, object_id_int, &data)
            .await?;
        if ids.len() > 1 {
            // Duplicate entries for one object; keep the oldest.
            let pruned = self.store.delete_entry_ids(&ids[1..]).await?;
            warn!(
                engine = %self.slug,
                content_type = descriptor.content_type,
                object_id = %object_id,
                pruned,
                "repaired duplicate search entries"
            );
            return Ok((None, pruned));
        }
        Ok((None, 0))
    }

    /// Create or refresh the entry for one object immediately.
    pub async fn update_obj_index(&self, obj: &dyn Searchable) -> Result<(), SearchError> {
        let (pending, _pruned) = self.refresh_object(obj).await?;
        if let Some(entry) = pending {
            self.store.insert_entries(std::slice::from_ref(&entry)).await?;
        }
        Ok(())
    }

    /// Extract the pending insert for `obj` without creating it, updating
    /// any existing entries in place. Used by batched context flushes.
    pub(crate) async fn index_entry_for(
        &self,
        obj: &dyn Searchable,
    ) -> Result<Option<NewSearchEntry>, SearchError> {
        let (pending, _pruned) = self.refresh_object(obj).await?;
        Ok(pending)
    }

    /// Verify `obj`'s type is registered here; save hooks call this before
    /// deferring work so misregistration fails at the call site, not at
    /// flush time.
    pub(crate) fn check_registered(&self, obj: &dyn Searchable) -> Result<(), SearchError> {
        self.registration(obj.descriptor().content_type).map(|_| ())
    }

    /// Save hook: defer the index update into `ctx` when a scope is open,
    /// otherwise apply it immediately. Call this wherever an indexed object
    /// is created or modified.
    pub async fn handle_save(
        self: &Arc<Self>,
        ctx: &mut crate::context::SearchContext,
        obj: Arc<dyn Searchable>,
    ) -> Result<(), SearchError> {
        self.check_registered(obj.as_ref())?;
        if ctx.is_active() {
            ctx.add_to_context(self.clone(), obj)
        } else {
            self.update_obj_index(obj.as_ref()).await
        }
    }

    /// Remove the entries for one object immediately.
    pub async fn handle_delete(&self, obj: &dyn Searchable) -> Result<(), SearchError> {
        let descriptor = obj.descriptor();
        self.registration(descriptor.content_type)?;
        let object_id = obj.pk().as_text();
        let object_id_int = if descriptor.pk_kind.uses_int_column() {
            obj.pk().as_int()
        } else {
            None
        };
        let deleted = self
            .store
            .delete_entries_for_object(&self.slug, descriptor, &object_id, object_id_int)
            .await?;
        debug!(
            engine = %self.slug,
            content_type = descriptor.content_type,
            object_id = %object_id,
            deleted,
            "removed search entries"
        );
        Ok(())
    }

    /// Search every registered model with default options.
    pub async fn search(&self, search_text: &str) -> Result<Vec<SearchEntry>, SearchError> {
        self.search_with(search_text, &SearchOptions::default()).await
    }

    /// Search with explicit model scoping and ranking control. Blank
    /// search text yields no results.
    pub async fn search_with(
        &self,
        search_text: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchEntry>, SearchError> {
        let search_text = search_text.trim();
        if search_text.is_empty() {
            return Ok(Vec::new());
        }
        let included = if options.models.is_empty() {
            self.registered_models()
                .into_iter()
                .map(ModelSelector::Model)
                .collect()
        } else {
            options.models.clone()
        };
        let mut filter = self.selectors_fragment(&included, true)?;
        if !options.exclude.is_empty() {
            let excluded = self.selectors_fragment(&options.exclude, false)?;
            let mut params = filter.params;
            params.extend(excluded.params);
            filter = SqlFragment::with_params(
                format!("({}) AND NOT ({})", filter.sql, excluded.sql),
                params,
            );
        }
        self.store
            .search(&self.slug, &filter, search_text, options.ranking)
            .await
    }

    /// Which rows of `model`'s own table match `search_text`, ranked.
    pub async fn filter(
        &self,
        model: &'static ModelDescriptor,
        search_text: &str,
    ) -> Result<Vec<FilterHit>, SearchError> {
        self.filter_with(model, search_text, true).await
    }

    /// Blank search text leaves the model unfiltered: every row matches,
    /// without ranks.
    pub async fn filter_with(
        &self,
        model: &'static ModelDescriptor,
        search_text: &str,
        ranking: bool,
    ) -> Result<Vec<FilterHit>, SearchError> {
        let search_text = search_text.trim();
        if search_text.is_empty() {
            return self.store.model_pks(model).await;
        }
        self.store
            .filter(&self.slug, model, search_text, ranking)
            .await
    }

    /// Rebuild entries for the named models (all registered models when
    /// empty): refresh every live object and prune entries for types no
    /// longer registered.
    pub async fn build_index(&self, models: &[&str]) -> Result<RebuildReport, SearchError> {
        let targets: Vec<&'static str> = if models.is_empty() {
            self.registered_models()
        } else {
            let mut targets = Vec::with_capacity(models.len());
            for name in models {
                targets.push(self.registration(name)?.descriptor.content_type);
            }
            targets
        };

        let mut report = RebuildReport::default();
        let mut pending = Vec::new();
        for content_type in &targets {
            let registered = self.registration(content_type)?;
            let objects = (registered.loader)();
            for obj in objects {
                let (new_entry, pruned) = self.refresh_object(obj.as_ref()).await?;
                if let Some(entry) = new_entry {
                    pending.push(entry);
                }
                report.refreshed += 1;
                report.deleted += pruned as usize;
            }
        }
        self.store.insert_entries(&pending).await?;

        let keep = self.registered_models();
        report.deleted += self.store.delete_stale_types(&self.slug, &keep).await? as usize;

        info!(
            engine = %self.slug,
            refreshed = report.refreshed,
            deleted = report.deleted,
            "rebuilt search index"
        );
        Ok(report)
    }

    /// Whether the store's backend has its auxiliary schema in place.
    pub async fn is_installed(&self) -> Result<bool, SearchError> {
        self.store.backend().is_installed(self.store.pool()).await
    }

    /// Install backend schema if missing. A no-op for backends that need
    /// none, and when already installed.
    pub async fn install(&self) -> Result<(), SearchError> {
        let backend = self.store.backend();
        if !backend.requires_installation() || backend.is_installed(self.store.pool()).await? {
            return Ok(());
        }
        backend.do_install(self.store.pool()).await?;
        info!(engine = %self.slug, "installed search backend schema");
        Ok(())
    }

    /// Remove backend schema if present.
    pub async fn uninstall(&self) -> Result<(), SearchError> {
        let backend = self.store.backend();
        if !backend.requires_installation() || !backend.is_installed(self.store.pool()).await? {
            return Ok(());
        }
        backend.do_uninstall(self.store.pool()).await?;
        info!(engine = %self.slug, "removed search backend schema");
        Ok(())
    }

    fn selectors_fragment(
        &self,
        selectors: &[ModelSelector],
        include: bool,
    ) -> Result<SqlFragment, SearchError> {
        let mut clauses = Vec::with_capacity(selectors.len());
        let mut params = Vec::new();
        for selector in selectors {
            let fragment = self.selector_fragment(selector, include)?;
            clauses.push(format!("({})", fragment.sql));
            params.extend(fragment.params);
        }
        if clauses.is_empty() {
            return Ok(SqlFragment::always());
        }
        Ok(SqlFragment::with_params(clauses.join(" OR "), params))
    }

    fn selector_fragment(
        &self,
        selector: &ModelSelector,
        include: bool,
    ) -> Result<SqlFragment, SearchError> {
        match selector {
            ModelSelector::Model(content_type) => {
                let registered = self.registration(content_type)?;
                // Live restriction narrows inclusion only; excluding a
                // whole model excludes all of its entries.
                let live = if include {
                    registered.adapter.live_ids()
                } else {
                    None
                };
                match live {
                    Some(ids) => {
                        subset_fragment(content_type, registered.descriptor.pk_kind, &ids)
                    }
                    None => Ok(SqlFragment::with_params(
                        "search_entries.content_type = ?".to_string(),
                        vec![SqlParam::Text(content_type.to_string())],
                    )),
                }
            }
            ModelSelector::Subset(content_type, ids) => {
                let registered = self.registration(content_type)?;
                subset_fragment(content_type, registered.descriptor.pk_kind, ids)
            }
        }
    }
}

/// Entry condition for "this content type, these objects". An empty id set
/// is a valid, satisfiable-by-nothing condition rather than invalid SQL.
/// A key that does not fit the model's key kind is a caller error, not a
/// value to silently drop from the condition.
fn subset_fragment(
    content_type: &str,
    pk_kind: PkKind,
    ids: &[PrimaryKey],
) -> Result<SqlFragment, SearchError> {
    let mut params = vec![SqlParam::Text(content_type.to_string())];
    let id_clause = if pk_kind.uses_int_column() {
        let mut ints = Vec::with_capacity(ids.len());
        for pk in ids {
            match pk.as_int() {
                Some(value) => ints.push(value),
                None => {
                    return Err(SearchError::Registration(format!(
                        "{content_type} uses integer keys but the subset contains {:?}",
                        pk.as_text()
                    )))
                }
            }
        }
        if ints.is_empty() {
            "1 = 0".to_string()
        } else {
            let placeholders = vec!["?"; ints.len()].join(", ");
            params.extend(ints.into_iter().map(SqlParam::Int));
            format!("search_entries.object_id_int IN ({placeholders})")
        }
    } else if ids.is_empty() {
        "1 = 0".to_string()
    } else {
        params.extend(ids.iter().map(|pk| SqlParam::Text(pk.as_text())));
        format!(
            "search_entries.object_id IN ({})",
            vec!["?"; ids.len()].join(", ")
        )
    };
    Ok(SqlFragment::with_params(
        format!("search_entries.content_type = ? AND {id_clause}"),
        params,
    ))
}

impl Drop for SearchEngine {
    fn drop(&mut self) {
        CREATED_ENGINES.lock().retain(|slug| slug != &self.slug);
    }
}
