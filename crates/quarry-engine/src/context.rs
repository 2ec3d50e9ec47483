//! Execution contexts.
//!
//! A [`Context`] is a cheaply cloneable handle to one execution context:
//! its arena, its error state, and its current query's start time. All
//! clones share the same state. The context is finalized explicitly with
//! [`Context::finalize`] or implicitly when the last handle is dropped;
//! either way every segment it mapped is returned to the operating system.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use quarry_arena::{
    ArenaConfig, ArenaError, ArenaPtr, ArenaStats, ContextArena, LifoPtr, LifoRelease, PageMapper,
};
use quarry_core::{ContextId, Timestamp};

use crate::error::EngineError;
use crate::registry::ContextRegistry;

/// Options for opening a context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContextFlags {
    /// Do not register the context with the runtime. Detached contexts
    /// are invisible to [`Runtime::contexts`](crate::Runtime::contexts) and
    /// are not finalized by [`Runtime::shutdown`](crate::Runtime::shutdown).
    pub detached: bool,
}

impl ContextFlags {
    /// Flags for a detached context.
    pub const DETACHED: Self = Self { detached: true };
}

struct ContextState {
    /// `None` once finalized.
    arena: Option<ContextArena>,
    last_error: Option<EngineError>,
    query_started: Timestamp,
}

pub(crate) struct ContextInner {
    id: ContextId,
    flags: ContextFlags,
    state: Mutex<ContextState>,
    registry: Option<Arc<ContextRegistry>>,
}

impl ContextInner {
    /// Unmap everything and leave the registry. Returns `false` if the
    /// context was already finalized.
    pub(crate) fn finalize(&self) -> bool {
        let released = {
            let mut state = self.state.lock();
            state.arena.take().map(|mut arena| arena.release_all())
        };
        if let Some(registry) = &self.registry {
            registry.deregister(self.id);
        }
        match released {
            Some(segments) => {
                tracing::debug!(context = %self.id, segments, "context finalized");
                true
            }
            None => false,
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.finalize();
    }
}

/// Handle to an execution context.
///
/// Every memory operation locks the context once for its duration.
/// Failures are returned to the caller and also recorded as the context's
/// last error.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    pub(crate) fn open(
        config: ArenaConfig,
        mapper: Arc<dyn PageMapper>,
        flags: ContextFlags,
        registry: Option<Arc<ContextRegistry>>,
    ) -> Result<Self, EngineError> {
        let id = ContextId::next();
        let arena = ContextArena::new(id, config, mapper)?;
        let ctx = Self {
            inner: Arc::new(ContextInner {
                id,
                flags,
                state: Mutex::new(ContextState {
                    arena: Some(arena),
                    last_error: None,
                    query_started: Timestamp::now(),
                }),
                registry,
            }),
        };
        if let Some(registry) = &ctx.inner.registry {
            registry.register(&ctx);
        }
        Ok(ctx)
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    /// This context's id.
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Flags the context was opened with.
    pub fn flags(&self) -> ContextFlags {
        self.inner.flags
    }

    /// Whether [`Context::finalize`] has run.
    pub fn is_finalized(&self) -> bool {
        self.inner.state.lock().arena.is_none()
    }

    /// Unmap every segment and deregister. Idempotent; returns `false` if
    /// the context was already finalized.
    pub fn finalize(&self) -> bool {
        self.inner.finalize()
    }

    // ── Error state ────────────────────────────────────────────────

    /// The most recent failure, if any.
    pub fn last_error(&self) -> Option<EngineError> {
        self.inner.state.lock().last_error.clone()
    }

    /// Reset the error state, returning what was recorded.
    pub fn clear_error(&self) -> Option<EngineError> {
        self.inner.state.lock().last_error.take()
    }

    // ── Query timing ───────────────────────────────────────────────

    /// Stamp the start of a new query and return the stamp.
    pub fn begin_query(&self) -> Timestamp {
        let now = Timestamp::now();
        self.inner.state.lock().query_started = now;
        now
    }

    /// Start time of the current query. Cached results produced by this
    /// context are created at this time.
    pub fn query_started(&self) -> Timestamp {
        self.inner.state.lock().query_started
    }

    // ── Memory ─────────────────────────────────────────────────────

    /// Allocate `size` bytes from the bump discipline.
    pub fn alloc(&self, size: usize) -> Result<ArenaPtr, EngineError> {
        self.with_arena("alloc", |a| a.alloc(size))
    }

    /// Allocate `size` zeroed bytes.
    pub fn alloc_zeroed(&self, size: usize) -> Result<ArenaPtr, EngineError> {
        self.with_arena("alloc_zeroed", |a| a.alloc_zeroed(size))
    }

    /// Allocate a copy of `src`.
    pub fn alloc_copy(&self, src: &[u8]) -> Result<ArenaPtr, EngineError> {
        self.with_arena("alloc_copy", |a| a.alloc_copy(src))
    }

    /// Release a bump block. An invalid handle is reported and leaves the
    /// context usable.
    pub fn free(&self, ptr: ArenaPtr) -> Result<(), EngineError> {
        self.with_arena("free", |a| a.free(ptr))
    }

    /// Resize a bump block; see [`ContextArena::realloc`].
    pub fn realloc(
        &self,
        ptr: Option<ArenaPtr>,
        new_size: usize,
    ) -> Result<Option<ArenaPtr>, EngineError> {
        self.with_arena("realloc", |a| a.realloc(ptr, new_size))
    }

    /// Allocate `size` bytes from the LIFO discipline.
    pub fn alloc_lifo(&self, size: usize) -> Result<LifoPtr, EngineError> {
        self.with_arena("alloc_lifo", |a| a.alloc_lifo(size))
    }

    /// Release a LIFO block and everything allocated after it.
    pub fn free_lifo(&self, ptr: LifoPtr) -> Result<LifoRelease, EngineError> {
        self.with_arena("free_lifo", |a| a.free_lifo(ptr))
    }

    /// Run `f` over the bytes of a bump block.
    pub fn with_bytes<R>(
        &self,
        ptr: &ArenaPtr,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, EngineError> {
        self.with_arena("bytes", |a| a.bytes(ptr).map(f))
    }

    /// Run `f` over the bytes of a bump block, mutably.
    pub fn with_bytes_mut<R>(
        &self,
        ptr: &ArenaPtr,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, EngineError> {
        self.with_arena("bytes_mut", |a| a.bytes_mut(ptr).map(f))
    }

    /// Run `f` over the bytes of a LIFO block.
    pub fn with_lifo_bytes<R>(
        &self,
        ptr: &LifoPtr,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, EngineError> {
        self.with_arena("lifo_bytes", |a| a.lifo_bytes(ptr).map(f))
    }

    /// Run `f` over the bytes of a LIFO block, mutably.
    pub fn with_lifo_bytes_mut<R>(
        &self,
        ptr: &LifoPtr,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, EngineError> {
        self.with_arena("lifo_bytes_mut", |a| a.lifo_bytes_mut(ptr).map(f))
    }

    /// Live-count of a bump segment, for diagnostics.
    pub fn live_count(&self, segment: u16) -> Option<u32> {
        self.inner.state.lock().arena.as_ref()?.live_count(segment)
    }

    /// Usage snapshot of the arena.
    pub fn arena_stats(&self) -> Result<ArenaStats, EngineError> {
        self.with_arena("stats", |a| Ok::<_, ArenaError>(a.stats()))
    }

    fn with_arena<R>(
        &self,
        op: &'static str,
        f: impl FnOnce(&mut ContextArena) -> Result<R, ArenaError>,
    ) -> Result<R, EngineError> {
        let mut state = self.inner.state.lock();
        let result = match state.arena.as_mut() {
            Some(arena) => f(arena).map_err(EngineError::from),
            None => Err(EngineError::ContextFinalized {
                context: self.inner.id,
            }),
        };
        if let Err(e) = &result {
            tracing::warn!(context = %self.inner.id, op, error = %e, "context operation failed");
            state.last_error = Some(e.clone());
        }
        result
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("flags", &self.inner.flags)
            .field("finalized", &self.is_finalized())
            .finish()
    }
}
