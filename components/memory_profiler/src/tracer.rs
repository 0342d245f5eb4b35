//! Process-wide allocation tracer
//!
//! [`TracingAllocator`] wraps the real allocator and, once tracing has been
//! started, records every live block together with the call stack that
//! allocated it. [`GlobalTracer`] is the [`AllocationTracer`] view of that
//! process-wide state.
//!
//! ```ignore
//! #[global_allocator]
//! static GLOBAL: TracingAllocator<std::alloc::System> =
//!     TracingAllocator::new(std::alloc::System);
//! ```
//!
//! The ledger is created on the first `start()` and lives for the rest of
//! the process. `start()` while tracing and `stop()` while stopped are no-ops.
//! Without the allocator installed the tracer still starts but observes
//! nothing.

use std::alloc::{GlobalAlloc, Layout};
use std::cell::Cell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use dashmap::DashMap;
use tracing::debug;

use crate::errors::HostError;
use crate::reclaim::{ReclaimOutcome, Reclaimable};
use crate::source::AllocationTracer;
use crate::types::{AllocationSite, TracedMemory, UNKNOWN_SITE};

/// Frames kept per allocation, profiler and allocator frames included
pub const MAX_STACK_DEPTH: usize = 32;

/// Symbol prefixes that never name the allocating line
const INTERNAL_PREFIXES: [&str; 10] = [
    "memory_profiler::tracer",
    "alloc::",
    "core::",
    "std::",
    "backtrace::",
    "dashmap::",
    "hashbrown::",
    "__rust",
    "__rdl",
    "__rg_",
];

/// Raw instruction pointers of one captured call stack, innermost first
#[derive(Clone, Copy, Hash, Eq, PartialEq, Debug)]
pub struct StackKey {
    len: u8,
    frames: [usize; MAX_STACK_DEPTH],
}

impl Default for StackKey {
    fn default() -> Self {
        Self {
            len: 0,
            frames: [0; MAX_STACK_DEPTH],
        }
    }
}

impl StackKey {
    /// Build a key from explicit addresses; extra frames are dropped
    pub fn from_frames(frames: &[usize]) -> Self {
        let mut key = Self::default();
        let len = frames.len().min(MAX_STACK_DEPTH);
        key.frames[..len].copy_from_slice(&frames[..len]);
        key.len = len as u8;
        key
    }

    pub fn frames(&self) -> &[usize] {
        &self.frames[..self.len as usize]
    }

    fn capture() -> Self {
        let mut key = Self::default();
        let mut len = 0usize;
        // SAFETY: only instruction pointers are read; symbolication is
        // deferred to snapshot time outside the allocator hook.
        unsafe {
            backtrace::trace_unsynchronized(|frame| {
                let ip = frame.ip() as usize;
                if ip == 0 {
                    return true;
                }
                if len >= MAX_STACK_DEPTH {
                    return false;
                }
                key.frames[len] = ip;
                len += 1;
                true
            });
        }
        key.len = len as u8;
        key
    }
}

#[derive(Clone, Copy)]
struct Block {
    stack: StackKey,
    size: u64,
}

#[derive(Clone, Copy, Default)]
struct StackStats {
    live_bytes: u64,
    live_count: u64,
}

/// Live-block bookkeeping shared by the allocator hook and snapshots
pub struct AllocationLedger {
    tracing: AtomicBool,
    current: AtomicU64,
    peak: AtomicU64,
    blocks: DashMap<usize, Block>,
    stacks: DashMap<StackKey, StackStats>,
    symbols: DashMap<usize, Vec<String>>,
}

impl AllocationLedger {
    pub fn new() -> Self {
        Self {
            tracing: AtomicBool::new(false),
            current: AtomicU64::new(0),
            peak: AtomicU64::new(0),
            blocks: DashMap::new(),
            stacks: DashMap::new(),
            symbols: DashMap::new(),
        }
    }

    pub fn start(&self) {
        if !self.tracing.swap(true, Ordering::SeqCst) {
            debug!("Allocation tracing started");
        }
    }

    /// Stop tracing and forget every recorded block
    pub fn stop(&self) {
        if !self.tracing.swap(false, Ordering::SeqCst) {
            return;
        }
        let Some(_guard) = ReentryGuard::enter() else {
            return;
        };
        self.blocks.clear();
        self.stacks.clear();
        self.current.store(0, Ordering::SeqCst);
        self.peak.store(0, Ordering::SeqCst);
        debug!("Allocation tracing stopped");
    }

    pub fn is_tracing(&self) -> bool {
        self.tracing.load(Ordering::SeqCst)
    }

    pub fn traced_memory(&self) -> TracedMemory {
        if !self.is_tracing() {
            return TracedMemory::default();
        }
        TracedMemory {
            current: self.current.load(Ordering::SeqCst),
            peak: self.peak.load(Ordering::SeqCst),
        }
    }

    /// Number of live traced blocks
    pub fn live_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Instruction pointers with cached source locations
    pub fn cached_symbols(&self) -> usize {
        self.symbols.len()
    }

    /// Drop the symbol cache, returning how many entries it held
    pub fn clear_symbol_cache(&self) -> u64 {
        let _guard = ReentryGuard::enter();
        let cached = self.symbols.len() as u64;
        self.symbols.clear();
        cached
    }

    fn on_alloc(&self, ptr: usize, size: usize) {
        if !self.is_tracing() {
            return;
        }
        let Some(_guard) = ReentryGuard::enter() else {
            return;
        };
        self.record_alloc(ptr, size as u64, StackKey::capture());
    }

    fn on_dealloc(&self, ptr: usize) {
        if !self.is_tracing() {
            return;
        }
        let Some(_guard) = ReentryGuard::enter() else {
            return;
        };
        self.record_dealloc(ptr);
    }

    /// First half of a reallocation, run before the inner allocator can
    /// release `old_ptr` to another thread
    fn begin_realloc(&self, old_ptr: usize) -> Option<Block> {
        if !self.is_tracing() {
            return None;
        }
        let _guard = ReentryGuard::enter()?;
        self.take_block(old_ptr)
    }

    /// Second half of a reallocation; a null `new_ptr` means the old block
    /// is still live and goes back into the ledger
    fn finish_realloc(
        &self,
        old_ptr: usize,
        new_ptr: usize,
        new_size: usize,
        old: Option<Block>,
    ) {
        if !self.is_tracing() {
            return;
        }
        let Some(_guard) = ReentryGuard::enter() else {
            return;
        };
        if new_ptr == 0 {
            if let Some(block) = old {
                self.record_alloc(old_ptr, block.size, block.stack);
            }
            return;
        }
        self.record_alloc(new_ptr, new_size as u64, StackKey::capture());
    }

    /// Record a live block allocated from `stack`
    pub fn record_alloc(&self, ptr: usize, size: u64, stack: StackKey) {
        // Address reuse after a free we never saw
        self.record_dealloc(ptr);

        self.blocks.insert(ptr, Block { stack, size });
        {
            let mut stats = self.stacks.entry(stack).or_default();
            stats.live_bytes = stats.live_bytes.saturating_add(size);
            stats.live_count = stats.live_count.saturating_add(1);
        }

        let current = self.current.fetch_add(size, Ordering::SeqCst).saturating_add(size);
        self.peak.fetch_max(current, Ordering::SeqCst);
    }

    /// Forget the block at `ptr`; returns whether it was being traced
    pub fn record_dealloc(&self, ptr: usize) -> bool {
        self.take_block(ptr).is_some()
    }

    fn take_block(&self, ptr: usize) -> Option<Block> {
        let (_, block) = self.blocks.remove(&ptr)?;

        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                Some(c.saturating_sub(block.size))
            });

        if let Some(mut stats) = self.stacks.get_mut(&block.stack) {
            stats.live_bytes = stats.live_bytes.saturating_sub(block.size);
            stats.live_count = stats.live_count.saturating_sub(1);
        }
        self.stacks.remove_if(&block.stack, |_, stats| stats.live_count == 0);
        Some(block)
    }

    /// Snapshot resolving raw stacks to source locations
    pub fn snapshot(&self) -> Result<Vec<AllocationSite>, HostError> {
        self.snapshot_with(|stack| self.format_traceback(stack))
    }

    /// Snapshot with a caller-supplied stack formatter
    ///
    /// Stacks whose formatted tracebacks share a first line are merged, so
    /// grouping happens at source-line granularity. Sites come back ordered
    /// by live bytes, largest first.
    pub fn snapshot_with<F>(&self, format: F) -> Result<Vec<AllocationSite>, HostError>
    where
        F: Fn(&StackKey) -> Vec<String>,
    {
        if !self.is_tracing() {
            return Err(HostError::TracerNotStarted);
        }
        let Some(_guard) = ReentryGuard::enter() else {
            return Err(HostError::SnapshotFailed(
                "snapshot requested from inside the allocator".to_string(),
            ));
        };

        let rows: Vec<(StackKey, StackStats)> = self
            .stacks
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();

        let mut by_line: HashMap<String, AllocationSite> = HashMap::new();
        for (stack, stats) in rows {
            let traceback = format(&stack);
            let label = traceback
                .first()
                .cloned()
                .unwrap_or_else(|| UNKNOWN_SITE.to_string());

            let site = by_line.entry(label).or_insert_with(|| AllocationSite {
                traceback,
                size_bytes: 0,
                count: 0,
            });
            site.size_bytes = site.size_bytes.saturating_add(stats.live_bytes);
            site.count = site.count.saturating_add(stats.live_count);
        }

        let mut sites: Vec<AllocationSite> = by_line.into_values().collect();
        sites.sort_by(|a, b| {
            b.size_bytes
                .cmp(&a.size_bytes)
                .then_with(|| a.label().cmp(b.label()))
        });
        Ok(sites)
    }

    /// Source locations of a stack, allocator and profiler frames removed
    fn format_traceback(&self, stack: &StackKey) -> Vec<String> {
        stack
            .frames()
            .iter()
            .flat_map(|ip| self.resolve_frame(*ip))
            .collect()
    }

    fn resolve_frame(&self, ip: usize) -> Vec<String> {
        if let Some(cached) = self.symbols.get(&ip) {
            return cached.clone();
        }

        let mut lines = Vec::new();
        // Return addresses point past the call; step back into it
        backtrace::resolve(ip.saturating_sub(1) as *mut c_void, |symbol| {
            let name = symbol.name().map(|n| n.to_string());
            if name.as_deref().is_some_and(is_internal_symbol) {
                return;
            }
            match (symbol.filename(), symbol.lineno()) {
                (Some(file), Some(line)) => lines.push(format!("{}:{}", file.display(), line)),
                _ => {
                    if let Some(name) = name {
                        lines.push(name);
                    }
                }
            }
        });

        self.symbols.insert(ip, lines.clone());
        lines
    }
}

impl Default for AllocationLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn is_internal_symbol(symbol: &str) -> bool {
    let symbol = symbol.trim_start_matches('<');
    INTERNAL_PREFIXES
        .iter()
        .any(|prefix| symbol.starts_with(prefix))
}

thread_local! {
    static IN_TRACER_HOOK: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the tracer so that allocations made
/// by the bookkeeping itself are not traced
struct ReentryGuard;

impl ReentryGuard {
    fn enter() -> Option<Self> {
        IN_TRACER_HOOK
            .try_with(|flag| {
                if flag.get() {
                    None
                } else {
                    flag.set(true);
                    Some(Self)
                }
            })
            .ok()
            .flatten()
    }
}

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        let _ = IN_TRACER_HOOK.try_with(|flag| flag.set(false));
    }
}

static LEDGER: OnceLock<AllocationLedger> = OnceLock::new();

/// The process-wide ledger, created on first use
pub fn ledger() -> &'static AllocationLedger {
    LEDGER.get_or_init(AllocationLedger::new)
}

/// [`AllocationTracer`] over the process-wide ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalTracer;

impl GlobalTracer {
    /// Stop tracing and drop all recorded blocks
    pub fn stop(&self) {
        if let Some(ledger) = LEDGER.get() {
            ledger.stop();
        }
    }
}

impl AllocationTracer for GlobalTracer {
    fn start(&self) {
        ledger().start();
    }

    fn is_tracing(&self) -> bool {
        LEDGER.get().is_some_and(AllocationLedger::is_tracing)
    }

    fn traced_memory(&self) -> TracedMemory {
        LEDGER
            .get()
            .map(AllocationLedger::traced_memory)
            .unwrap_or_default()
    }

    fn snapshot(&self) -> Result<Vec<AllocationSite>, HostError> {
        LEDGER
            .get()
            .ok_or(HostError::TracerNotStarted)
            .and_then(AllocationLedger::snapshot)
    }
}

/// The resolved-symbol cache is the tracer's only reclaimable memory
impl Reclaimable for GlobalTracer {
    fn name(&self) -> &str {
        "allocation-symbol-cache"
    }

    fn live_objects(&self) -> u64 {
        LEDGER
            .get()
            .map(|ledger| ledger.cached_symbols() as u64)
            .unwrap_or(0)
    }

    fn reclaim(&self) -> Result<ReclaimOutcome, HostError> {
        let collected = LEDGER
            .get()
            .map(AllocationLedger::clear_symbol_cache)
            .unwrap_or(0);
        Ok(ReclaimOutcome {
            collected,
            uncollectable: 0,
        })
    }
}

/// Global allocator wrapper feeding the process-wide ledger
pub struct TracingAllocator<A> {
    inner: A,
}

impl<A> TracingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

// SAFETY: every call is forwarded unchanged to `inner`; the hooks only
// observe pointers and never touch the memory behind them.
unsafe impl<A: GlobalAlloc> GlobalAlloc for TracingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            if let Some(ledger) = LEDGER.get() {
                ledger.on_alloc(ptr as usize, layout.size());
            }
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            if let Some(ledger) = LEDGER.get() {
                ledger.on_alloc(ptr as usize, layout.size());
            }
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        // Forget the block before the address can be handed out again
        if let Some(ledger) = LEDGER.get() {
            ledger.on_dealloc(ptr as usize);
        }
        self.inner.dealloc(ptr, layout);
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        // Same ordering as dealloc: once the inner allocator moves the
        // block, `ptr` may already belong to another thread
        let ledger = LEDGER.get();
        let old = ledger.and_then(|ledger| ledger.begin_realloc(ptr as usize));
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if let Some(ledger) = ledger {
            ledger.finish_realloc(ptr as usize, new_ptr as usize, new_size, old);
        }
        new_ptr
    }
}
