// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deferred index updates over explicit unit-of-work scopes.
//!
//! A [`SearchContext`] is owned by the unit of work it serves (a request
//! handler, a job, a test) rather than hiding in task-local storage, so it
//! behaves the same no matter how the async runtime migrates work between
//! threads.
//!
//! While a scope is open, save hooks collect into it instead of writing to
//! the database; each object is indexed once no matter how often it was
//! saved. Closing the scope flushes the survivors in one batched write, or
//! drops them all when the scope was invalidated. Scopes nest: each inner
//! scope flushes (or abandons) independently of its parent.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::engine::SearchEngine;
use crate::error::SearchError;
use crate::model::Searchable;

/// (engine slug, content type, object id): one pending update per object
/// per engine, last write wins.
type PendingKey = (String, String, String);

struct PendingTask {
    engine: Arc<SearchEngine>,
    object: Arc<dyn Searchable>,
}

struct Scope {
    pending: HashMap<PendingKey, PendingTask>,
    invalid: bool,
}

#[derive(Default)]
pub struct SearchContext {
    stack: Vec<Scope>,
}

impl SearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new scope. Save hooks defer into the innermost open scope.
    pub fn start(&mut self) {
        self.stack.push(Scope {
            pending: HashMap::new(),
            invalid: false,
        });
    }

    pub fn is_active(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Pending updates in the innermost scope.
    pub fn pending(&self) -> usize {
        self.stack.last().map_or(0, |scope| scope.pending.len())
    }

    /// Defer an index update for `object` into the innermost scope.
    pub fn add_to_context(
        &mut self,
        engine: Arc<SearchEngine>,
        object: Arc<dyn Searchable>,
    ) -> Result<(), SearchError> {
        let scope = self.stack.last_mut().ok_or_else(|| {
            SearchError::Context("no open scope to defer an index update into".to_string())
        })?;
        let key = (
            engine.slug().to_string(),
            object.descriptor().content_type.to_string(),
            object.pk().as_text(),
        );
        scope.pending.insert(key, PendingTask { engine, object });
        Ok(())
    }

    /// Mark the innermost scope invalid: its pending updates are abandoned
    /// when it ends.
    pub fn invalidate(&mut self) -> Result<(), SearchError> {
        let scope = self.stack.last_mut().ok_or_else(|| {
            SearchError::Context("no open scope to invalidate".to_string())
        })?;
        scope.invalid = true;
        Ok(())
    }

    pub fn is_invalid(&self) -> Result<bool, SearchError> {
        self.stack
            .last()
            .map(|scope| scope.invalid)
            .ok_or_else(|| SearchError::Context("no open scope".to_string()))
    }

    /// Close the innermost scope. A valid scope flushes its pending updates
    /// in one batched write per engine; an invalid scope discards them.
    /// Returns the number of objects flushed.
    pub async fn end(&mut self) -> Result<usize, SearchError> {
        let scope = self.stack.pop().ok_or_else(|| {
            SearchError::Context("no open scope to end".to_string())
        })?;
        if scope.invalid {
            debug!(abandoned = scope.pending.len(), "abandoned search context scope");
            return Ok(0);
        }
        let flushed = scope.pending.len();

        // Group by engine so each engine's new entries land in one batch.
        let mut by_engine: HashMap<String, (Arc<SearchEngine>, Vec<Arc<dyn Searchable>>)> =
            HashMap::new();
        for (_key, task) in scope.pending {
            by_engine
                .entry(task.engine.slug().to_string())
                .or_insert_with(|| (task.engine.clone(), Vec::new()))
                .1
                .push(task.object);
        }

        for (_slug, (engine, objects)) in by_engine {
            let mut new_entries = Vec::new();
            for object in &objects {
                if let Some(entry) = engine.index_entry_for(object.as_ref()).await? {
                    new_entries.push(entry);
                }
            }
            engine.store().insert_entries(&new_entries).await?;
        }

        debug!(flushed, "flushed search context scope");
        Ok(flushed)
    }

    /// Run `body` inside a fresh scope, flushing on success and abandoning
    /// the scope's updates when `body` fails.
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use sleuth::{SearchContext, SearchEngine, SearchError, Searchable};
    /// # async fn demo(engine: Arc<SearchEngine>, obj: Arc<dyn Searchable>) -> Result<(), SearchError> {
    /// let mut ctx = SearchContext::new();
    /// ctx.update_index(|ctx| {
    ///     let engine = engine.clone();
    ///     let obj = obj.clone();
    ///     Box::pin(async move {
    ///         engine.handle_save(ctx, obj).await?;
    ///         Ok::<_, SearchError>(())
    ///     })
    /// })
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn update_index<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        E: From<SearchError>,
        F: for<'a> FnOnce(
            &'a mut SearchContext,
        ) -> Pin<Box<dyn Future<Output = Result<T, E>> + 'a>>,
    {
        self.start();
        let result = body(self).await;
        match result {
            Ok(value) => {
                self.end().await?;
                Ok(value)
            }
            Err(error) => {
                self.invalidate()?;
                self.end().await?;
                Err(error)
            }
        }
    }

    /// Run `body` inside a scope that is always abandoned: saves made
    /// within it never reach the index.
    pub async fn skip_index_update<T, E, F>(&mut self, body: F) -> Result<T, E>
    where
        E: From<SearchError>,
        F: for<'a> FnOnce(
            &'a mut SearchContext,
        ) -> Pin<Box<dyn Future<Output = Result<T, E>> + 'a>>,
    {
        self.start();
        let result = body(self).await;
        self.invalidate()?;
        self.end().await?;
        result
    }

    /// Close any scopes left open at the end of the unit of work, then
    /// report the imbalance as an error. A balanced context returns `Ok`.
    pub async fn finish(&mut self) -> Result<(), SearchError> {
        if !self.is_active() {
            return Ok(());
        }
        let open = self.stack.len();
        while self.is_active() {
            self.end().await?;
        }
        Err(SearchError::Context(format!(
            "unit of work finished with {open} open search context scope(s)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_scope_stack_discipline() {
        let mut ctx = SearchContext::new();
        assert!(!ctx.is_active());
        ctx.start();
        assert!(ctx.is_active());
        assert!(!ctx.is_invalid().unwrap());
        ctx.start();
        ctx.invalidate().unwrap();
        assert!(ctx.is_invalid().unwrap());
    }

    #[test]
    fn failure_operations_without_open_scope() {
        let mut ctx = SearchContext::new();
        assert!(matches!(ctx.invalidate(), Err(SearchError::Context(_))));
        assert!(matches!(ctx.is_invalid(), Err(SearchError::Context(_))));
    }

    #[tokio::test]
    async fn failure_end_without_open_scope() {
        let mut ctx = SearchContext::new();
        assert!(matches!(ctx.end().await, Err(SearchError::Context(_))));
    }

    #[tokio::test]
    async fn happy_invalid_scope_flushes_nothing() {
        let mut ctx = SearchContext::new();
        ctx.start();
        ctx.invalidate().unwrap();
        assert_eq!(ctx.end().await.unwrap(), 0);
        assert!(!ctx.is_active());
    }

    #[tokio::test]
    async fn happy_finish_on_balanced_context() {
        let mut ctx = SearchContext::new();
        ctx.start();
        ctx.end().await.unwrap();
        ctx.finish().await.unwrap();
    }

    #[tokio::test]
    async fn failure_finish_reports_open_scopes() {
        let mut ctx = SearchContext::new();
        ctx.start();
        ctx.start();
        let err = ctx.finish().await.unwrap_err();
        assert!(err.to_string().contains("2 open"));
        assert!(!ctx.is_active());
    }
}
