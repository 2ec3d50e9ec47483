//! The process runtime.
//!
//! [`Runtime`] replaces process-global state with one explicit object:
//! create it once with [`Runtime::init`], open contexts from it, and call
//! [`Runtime::shutdown`] to finalize every registered context and empty
//! the cache.

use std::fmt;
use std::sync::Arc;

use quarry_arena::{AnonymousPages, MapStats, PageMapper};
use quarry_cache::{CacheError, ResultCache};
use quarry_core::{ContextId, LastModified};

use crate::config::EngineConfig;
use crate::context::{Context, ContextFlags};
use crate::error::EngineError;
use crate::registry::ContextRegistry;

/// Owner of the shared cache, the context registry, and the page mapper.
pub struct Runtime {
    config: EngineConfig,
    mapper: Arc<dyn PageMapper>,
    cache: Arc<ResultCache>,
    registry: Arc<ContextRegistry>,
}

impl Runtime {
    /// Create a runtime backed by anonymous memory mappings.
    pub fn init(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_mapper(config, Arc::new(AnonymousPages::new()))
    }

    /// Create a runtime whose contexts map segments through `mapper`.
    pub fn with_mapper(
        config: EngineConfig,
        mapper: Arc<dyn PageMapper>,
    ) -> Result<Self, EngineError> {
        config.validate(mapper.page_size())?;
        tracing::info!(
            segment_bytes = config.arena.segment_bytes,
            max_segments = config.arena.max_segments,
            max_entries = config.cache.max_entries,
            "runtime initialised"
        );
        Ok(Self {
            cache: Arc::new(ResultCache::new(config.cache.clone())),
            registry: Arc::new(ContextRegistry::new()),
            config,
            mapper,
        })
    }

    /// The configuration the runtime was created with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared result cache.
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// The context registry.
    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Open a new context with an empty arena.
    pub fn open_context(&self, flags: ContextFlags) -> Result<Context, EngineError> {
        let registry = (!flags.detached).then(|| Arc::clone(&self.registry));
        let ctx = Context::open(
            self.config.arena.clone(),
            Arc::clone(&self.mapper),
            flags,
            registry,
        )?;
        tracing::debug!(context = %ctx.id(), detached = flags.detached, "context opened");
        Ok(ctx)
    }

    /// Finalize `ctx`. Returns `false` if it was already finalized.
    pub fn finalize_context(&self, ctx: Context) -> bool {
        ctx.finalize()
    }

    /// Ids of registered contexts in registration order.
    pub fn contexts(&self) -> Vec<ContextId> {
        self.registry.ids()
    }

    /// Mappings currently outstanding across every context, or zero if
    /// the mapper keeps no counters.
    pub fn alloc_count(&self) -> u64 {
        self.mapper.stats().map_or(0, MapStats::outstanding)
    }

    /// Finalize every registered context in registration order, then drop
    /// every cache entry regardless of references.
    ///
    /// The runtime stays usable; new contexts can be opened afterwards.
    pub fn shutdown(&self) {
        let contexts = self.registry.drain();
        let finalized = contexts.iter().filter(|ctx| ctx.finalize()).count();
        let entries = self.cache.clear();
        tracing::info!(contexts = finalized, entries, "runtime shut down");
    }

    /// Serve `key` from the cache, or run `produce` and cache its output.
    ///
    /// Starts a new query on `ctx` first; a produced result is cached with
    /// that start time. A hit is copied out and released immediately. A
    /// result that cannot be cached (entry busy, key too long) is still
    /// returned.
    pub fn execute_cached<F>(
        &self,
        ctx: &Context,
        key: &[u8],
        db: &dyn LastModified,
        produce: F,
    ) -> Result<Vec<u8>, EngineError>
    where
        F: FnOnce(&Context) -> Result<Vec<u8>, EngineError>,
    {
        let started = ctx.begin_query();
        if let Some(hit) = self.cache.fetch(key, db) {
            let out = hit.to_vec();
            self.cache.unref(key);
            return Ok(out);
        }
        let out = produce(ctx)?;
        match self.cache.update(key, &out, started) {
            Ok(()) | Err(CacheError::ResourceBusy { .. }) => {}
            Err(e) => tracing::debug!(context = %ctx.id(), error = %e, "result not cached"),
        }
        Ok(out)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("contexts", &self.registry)
            .field("cache", &self.cache)
            .finish()
    }
}
