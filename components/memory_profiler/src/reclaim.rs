//! Generational reclamation registry
//!
//! Rust frees memory deterministically, so the host's "collector" is the set
//! of caches and pools that can give memory back on demand. Each one
//! registers a [`Reclaimable`] hook into a generation; a forced pass walks
//! every generation in order and keeps per-generation counters.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::errors::HostError;
use crate::source::Reclaimer;
use crate::tracer::GlobalTracer;
use crate::types::GenerationStats;

/// Generations in a default registry
pub const DEFAULT_GENERATIONS: usize = 3;

/// What one hook gave back during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReclaimOutcome {
    /// Objects released
    pub collected: u64,
    /// Objects the hook holds but could not release
    pub uncollectable: u64,
}

/// A cache or pool that can release memory on request
pub trait Reclaimable: Send + Sync {
    fn name(&self) -> &str;

    /// Objects currently held
    fn live_objects(&self) -> u64;

    fn reclaim(&self) -> Result<ReclaimOutcome, HostError>;
}

#[derive(Default)]
struct Generation {
    hooks: RwLock<Vec<Arc<dyn Reclaimable>>>,
    stats: Mutex<GenerationStats>,
}

/// Ordered generations of reclaimable hooks, youngest first
pub struct ReclaimRegistry {
    generations: Vec<Generation>,
}

impl ReclaimRegistry {
    pub fn new(generations: usize) -> Self {
        Self {
            generations: (0..generations).map(|_| Generation::default()).collect(),
        }
    }

    /// Registry for the current process with the allocation tracer's
    /// symbol cache registered in the oldest generation
    pub fn for_process(generations: usize) -> Self {
        let registry = Self::new(generations);
        if let Some(oldest) = generations.checked_sub(1) {
            if let Err(e) = registry.register(oldest, Arc::new(GlobalTracer)) {
                warn!("Symbol cache not registered for reclamation: {}", e);
            }
        }
        registry
    }

    pub fn generation_count(&self) -> usize {
        self.generations.len()
    }

    /// Register `hook` in `generation` (0 is the youngest)
    pub fn register(
        &self,
        generation: usize,
        hook: Arc<dyn Reclaimable>,
    ) -> Result<(), HostError> {
        let target = self.generations.get(generation).ok_or_else(|| {
            HostError::ReclaimFailed(format!(
                "generation {} out of range (registry has {})",
                generation,
                self.generations.len()
            ))
        })?;

        debug!("Registered reclaimable '{}' in generation {}", hook.name(), generation);
        target.hooks.write().push(hook);
        Ok(())
    }

    /// Number of registered hooks across all generations
    pub fn hook_count(&self) -> usize {
        self.generations.iter().map(|g| g.hooks.read().len()).sum()
    }
}

impl Default for ReclaimRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_GENERATIONS)
    }
}

impl Reclaimer for ReclaimRegistry {
    /// Full pass over every generation
    ///
    /// A failing hook is logged and counted as yielding nothing; the pass
    /// still visits the remaining hooks.
    fn force_collect(&self) -> Result<u64, HostError> {
        let mut total = 0u64;

        for (index, generation) in self.generations.iter().enumerate() {
            let hooks: Vec<Arc<dyn Reclaimable>> = generation.hooks.read().clone();

            let mut pass = ReclaimOutcome::default();
            for hook in hooks {
                match hook.reclaim() {
                    Ok(outcome) => {
                        pass.collected = pass.collected.saturating_add(outcome.collected);
                        pass.uncollectable =
                            pass.uncollectable.saturating_add(outcome.uncollectable);
                    }
                    Err(e) => warn!("Reclaimable '{}' failed: {}", hook.name(), e),
                }
            }

            let mut stats = generation.stats.lock();
            stats.collections += 1;
            stats.collected = stats.collected.saturating_add(pass.collected);
            stats.uncollectable = stats.uncollectable.saturating_add(pass.uncollectable);

            debug!(
                "Generation {} pass: collected={} uncollectable={}",
                index, pass.collected, pass.uncollectable
            );
            total = total.saturating_add(pass.collected);
        }

        Ok(total)
    }

    fn generation_stats(&self) -> Vec<GenerationStats> {
        self.generations.iter().map(|g| *g.stats.lock()).collect()
    }

    fn live_object_count(&self) -> u64 {
        self.generations
            .iter()
            .flat_map(|g| g.hooks.read().clone())
            .map(|hook| hook.live_objects())
            .sum()
    }
}
