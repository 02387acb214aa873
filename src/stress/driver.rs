//! Seeded randomized load against a [`TestHeap`]
//!
//! The operation mix ramps the allocation rate up and down over a period of
//! `ramp` steps so the heap repeatedly fills, fragments and drains. Runs with
//! the same [`StressConfig`] are identical.

use super::heap::{CorruptionError, TestHeap};
use crate::memory::constants::PAGE_SIZE;
use crate::memory::errors::HeapError;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::fmt;
use tracing::{info, trace};

/// Parameters of a stress run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressConfig {
    pub seed: u64,
    /// Number of steps to run
    pub operations: usize,
    /// Starting heap size in bytes; grows on demand up to 64 KiB
    pub initial_size: usize,
    /// One step in `defrag_one_in` is a defrag
    pub defrag_one_in: u32,
    pub lock_one_in: u32,
    pub realloc_one_in: u32,
    /// Period of the allocate/free ramp
    pub ramp: u32,
    pub max_alloc: usize,
    pub max_realloc: usize,
    /// Verify the whole heap every this many steps (0 = only at the end)
    pub verify_every: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            seed: 0,
            operations: 100_000,
            initial_size: 32 * 1024,
            defrag_one_in: 50,
            lock_one_in: 20,
            realloc_one_in: 10,
            ramp: 15_000,
            max_alloc: 120,
            max_realloc: 250,
            verify_every: 1000,
        }
    }
}

impl StressConfig {
    pub fn validate(&self) -> Result<(), HeapError> {
        if self.initial_size == 0 || self.initial_size > PAGE_SIZE {
            return Err(HeapError::config(format!(
                "initial size {} must be in 1..={}",
                self.initial_size, PAGE_SIZE
            )));
        }
        if self.defrag_one_in == 0
            || self.lock_one_in == 0
            || self.realloc_one_in == 0
            || self.ramp == 0
        {
            return Err(HeapError::config("operation odds must be non-zero"));
        }
        if self.max_alloc == 0 || self.max_realloc == 0 {
            return Err(HeapError::config("maximum sizes must be non-zero"));
        }
        Ok(())
    }
}

/// One step of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Defrag {
        moved: bool,
    },
    Lock {
        id: u32,
    },
    Unlock {
        id: u32,
    },
    Alloc {
        size: usize,
        movable: bool,
        allow_defrag: bool,
        result: Option<(u32, usize)>,
    },
    Realloc {
        id: u32,
        from: usize,
        to: usize,
        allow_defrag: bool,
        position: Option<usize>,
    },
    Free {
        id: u32,
    },
}

impl Operation {
    pub fn failed(&self) -> bool {
        matches!(
            self,
            Operation::Alloc { result: None, .. } | Operation::Realloc { position: None, .. }
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Defrag { moved } => {
                write!(f, "defrag{}", if *moved { "" } else { " (nothing moved)" })
            }
            Operation::Lock { id } => write!(f, "lock #{}", id),
            Operation::Unlock { id } => write!(f, "unlock #{}", id),
            Operation::Alloc {
                size,
                movable,
                allow_defrag,
                result,
            } => {
                write!(
                    f,
                    "alloc {} bytes {} {}",
                    size,
                    if *movable { "movable" } else { "fixed" },
                    if *allow_defrag { "defrag" } else { "no-defrag" }
                )?;
                match result {
                    Some((id, position)) => write!(f, " = #{} @ {}", id, position),
                    None => write!(f, " failed"),
                }
            }
            Operation::Realloc {
                id,
                from,
                to,
                allow_defrag,
                position,
            } => {
                write!(
                    f,
                    "realloc #{} {} -> {} bytes {}",
                    id,
                    from,
                    to,
                    if *allow_defrag { "defrag" } else { "no-defrag" }
                )?;
                match position {
                    Some(position) => write!(f, " = @ {}", position),
                    None => write!(f, " failed"),
                }
            }
            Operation::Free { id } => write!(f, "free #{}", id),
        }
    }
}

/// Counters over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub allocs: usize,
    pub failed_allocs: usize,
    pub reallocs: usize,
    pub failed_reallocs: usize,
    pub frees: usize,
    pub defrags: usize,
    pub locks: usize,
    pub unlocks: usize,
}

impl RunStats {
    fn record(&mut self, op: &Operation) {
        match op {
            Operation::Defrag { .. } => self.defrags += 1,
            Operation::Lock { .. } => self.locks += 1,
            Operation::Unlock { .. } => self.unlocks += 1,
            Operation::Alloc { result, .. } => {
                self.allocs += 1;
                if result.is_none() {
                    self.failed_allocs += 1;
                }
            }
            Operation::Realloc { position, .. } => {
                self.reallocs += 1;
                if position.is_none() {
                    self.failed_reallocs += 1;
                }
            }
            Operation::Free { .. } => self.frees += 1,
        }
    }
}

/// A randomized run in progress
pub struct StressRun {
    config: StressConfig,
    rng: Pcg64,
    heap: TestHeap,
    live: Vec<u32>,
    step: usize,
    stats: RunStats,
}

impl StressRun {
    pub fn new(config: StressConfig) -> Result<Self, HeapError> {
        config.validate()?;
        Ok(StressRun {
            rng: Pcg64::seed_from_u64(config.seed),
            heap: TestHeap::new(config.initial_size),
            live: Vec::new(),
            step: 0,
            stats: RunStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &StressConfig {
        &self.config
    }

    pub fn heap(&self) -> &TestHeap {
        &self.heap
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Steps taken so far
    pub fn steps(&self) -> usize {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.config.operations
    }

    /// Take one step; `None` once the run is complete
    pub fn step(&mut self) -> Result<Option<Operation>, CorruptionError> {
        if self.is_finished() {
            return Ok(None);
        }
        self.step += 1;

        let op = self.choose();
        self.stats.record(&op);
        trace!(step = self.step, "{}", op);

        match &op {
            Operation::Alloc {
                result: Some((id, _)),
                ..
            }
            | Operation::Realloc {
                id,
                position: Some(_),
                ..
            } => self.heap.verify(*id)?,
            _ => {}
        }
        if self.config.verify_every > 0 && self.step % self.config.verify_every == 0 {
            self.heap.verify_all()?;
        }
        Ok(Some(op))
    }

    fn choose(&mut self) -> Operation {
        if self.rng.gen_range(0..self.config.defrag_one_in) == 1 {
            return Operation::Defrag {
                moved: self.heap.defrag(),
            };
        }

        if self.rng.gen_range(0..self.config.lock_one_in) == 1 && !self.live.is_empty() {
            let id = self.live[self.rng.gen_range(0..self.live.len())];
            let locked = self.heap.allocation(id).is_some_and(|a| a.locked);
            if self.rng.gen_bool(0.5) {
                if !locked && self.heap.lock(id) {
                    return Operation::Lock { id };
                }
            } else if locked && self.heap.unlock(id) {
                return Operation::Unlock { id };
            }
        }

        if self.rng.gen_range(0..self.config.realloc_one_in) == 1 && !self.live.is_empty() {
            let id = self.live[self.rng.gen_range(0..self.live.len())];
            let from = self.heap.allocation(id).map_or(0, |a| a.size);
            let to = self.rng.gen_range(1..=self.config.max_realloc);
            let allow_defrag = self.rng.gen_range(0..5) < 4;
            let movable = self.rng.gen_range(0..5) < 4;
            let position = self
                .heap
                .realloc(id, to, movable, allow_defrag)
                .then(|| self.heap.allocation(id).map(|a| a.position))
                .flatten();
            return Operation::Realloc {
                id,
                from,
                to,
                allow_defrag,
                position,
            };
        }

        let ramp = self.config.ramp;
        let phase = (self.step % ramp as usize) as u32;
        if self.rng.gen_range(0..ramp) < phase || self.live.is_empty() {
            let size = self.rng.gen_range(1..=self.config.max_alloc);
            let movable = self.rng.gen_range(0..5) < 4;
            let allow_defrag = self.rng.gen_range(0..5) < 4;
            let result = self.heap.alloc(size, movable, allow_defrag).map(|id| {
                self.live.push(id);
                (id, self.heap.allocation(id).map_or(0, |a| a.position))
            });
            Operation::Alloc {
                size,
                movable,
                allow_defrag,
                result,
            }
        } else {
            let index = self.rng.gen_range(0..self.live.len());
            let id = self.live.swap_remove(index);
            self.heap.free(id);
            Operation::Free { id }
        }
    }

    /// Defragment outside the random mix, then verify
    pub fn defrag(&mut self) -> Result<bool, CorruptionError> {
        let moved = self.heap.defrag();
        self.heap.verify_all()?;
        Ok(moved)
    }

    /// Defragment once more and verify everything
    pub fn finish(&mut self) -> Result<(), CorruptionError> {
        self.heap.defrag();
        self.heap.verify_all()
    }

    /// Run every remaining step, logging progress
    pub fn run(&mut self) -> Result<RunStats, CorruptionError> {
        let progress_every = (self.config.operations / 10).max(1);
        while self.step()?.is_some() {
            if self.step % progress_every == 0 {
                info!(
                    step = self.step,
                    allocations = self.heap.allocation_count(),
                    free_space = self.heap.free_space(),
                    free_regions = self.heap.free_region_count(),
                    "progress"
                );
            }
        }
        self.finish()?;
        info!(
            address_space = self.heap.address_space_size(),
            allocations = self.heap.allocation_count(),
            "run complete"
        );
        Ok(self.stats.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(seed: u64) -> StressConfig {
        StressConfig {
            seed,
            operations: 2000,
            initial_size: 1024,
            ramp: 500,
            verify_every: 100,
            ..StressConfig::default()
        }
    }

    #[test]
    fn test_run_completes_clean() {
        let mut run = StressRun::new(small_config(7)).unwrap();
        let stats = run.run().unwrap();
        assert!(run.is_finished());
        assert!(stats.allocs > 0);
        assert!(stats.frees > 0);
        assert!(stats.defrags > 0);
    }

    #[test]
    fn test_same_seed_same_operations() {
        let mut a = StressRun::new(small_config(42)).unwrap();
        let mut b = StressRun::new(small_config(42)).unwrap();
        for _ in 0..500 {
            assert_eq!(a.step().unwrap(), b.step().unwrap());
        }
    }

    #[test]
    fn test_step_after_finish_is_none() {
        let mut run = StressRun::new(StressConfig {
            operations: 3,
            ..small_config(1)
        })
        .unwrap();
        for _ in 0..3 {
            assert!(run.step().unwrap().is_some());
        }
        assert_eq!(run.step().unwrap(), None);
        assert_eq!(run.steps(), 3);
    }

    #[test]
    fn test_rejects_zero_odds() {
        let config = StressConfig {
            defrag_one_in: 0,
            ..StressConfig::default()
        };
        assert!(matches!(
            StressRun::new(config),
            Err(HeapError::InvalidConfig(_))
        ));
    }
}
