//! Stress and commit-race harnesses.
//!
//! These helpers drive VeriDB under heavy load and concurrent access,
//! and provide controlled commit races for testing the conflict
//! detection and the deadlock-free lock ordering of the commit path.

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};
use veridb_core::{CoreError, Database};

/// Outcome counters for one workload run.
#[derive(Debug, Clone)]
pub struct WorkloadReport {
    /// Operations attempted.
    pub attempted: usize,
    /// Operations that failed.
    pub failures: usize,
    /// Wall-clock time for the run.
    pub elapsed: Duration,
}

impl WorkloadReport {
    /// Throughput in operations per second.
    #[must_use]
    pub fn throughput(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.0;
        }
        self.attempted as f64 / self.elapsed.as_secs_f64()
    }

    /// One-line summary, visible under `cargo test -- --nocapture`.
    pub fn summarize(&self, name: &str) {
        println!(
            "{name}: {} ok / {} attempted in {:.2?} ({:.0} ops/s)",
            self.attempted - self.failures,
            self.attempted,
            self.elapsed,
            self.throughput(),
        );
    }
}

/// Workload sizing knobs.
///
/// Defaults are sized for unit-test runs against this engine: enough
/// operations over few enough keys to force key reuse and per-cell
/// lock contention, with values in the short-string range the store
/// typically holds.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations each workload performs.
    pub operations: usize,
    /// Worker threads for concurrent workloads.
    pub threads: usize,
    /// Distinct keys the workload cycles through.
    pub keys: usize,
    /// Length of generated values in bytes.
    pub value_len: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 4_096,
            threads: 8,
            keys: 128,
            value_len: 32,
        }
    }
}

fn key_for(index: usize, config: &StressConfig) -> Vec<u8> {
    format!("key_{}", index % config.keys).into_bytes()
}

fn value_for(index: usize, config: &StressConfig) -> Vec<u8> {
    let mut value = format!("value_{index}_").into_bytes();
    let len = config.value_len.max(value.len());
    value.resize(len, b'.');
    value
}

/// Runs single-key transactions back to back, one commit per write.
pub fn stress_sequential_writes(db: &Database, config: &StressConfig) -> WorkloadReport {
    let start = Instant::now();
    let mut failures = 0usize;

    for i in 0..config.operations {
        let id = format!("write_{i}");
        let outcome = db.transaction(&id, |tx| {
            tx.put(key_for(i, config), value_for(i, config))?;
            Ok(())
        });
        if outcome.is_err() {
            failures += 1;
        }
    }

    WorkloadReport {
        attempted: config.operations,
        failures,
        elapsed: start.elapsed(),
    }
}

/// Runs a random put/get/erase mix over a shared key range.
pub fn stress_mixed_operations(db: &Database, config: &StressConfig) -> WorkloadReport {
    let mut rng = rand::thread_rng();
    let start = Instant::now();
    let mut failures = 0usize;

    for i in 0..config.operations {
        let key = key_for(rng.gen_range(0..config.keys), config);
        let failed = match rng.gen_range(0..3) {
            0 => db.put(key, value_for(i, config)).is_err(),
            1 => {
                let _ = db.get(&key);
                false
            }
            _ => {
                db.erase(&key);
                false
            }
        };
        if failed {
            failures += 1;
        }
    }

    WorkloadReport {
        attempted: config.operations,
        failures,
        elapsed: start.elapsed(),
    }
}

/// Hammers reads from several threads against a pre-populated range.
///
/// Every read targets a populated key, so a miss counts as a failure.
pub fn stress_concurrent_reads(db: &Database, config: &StressConfig) -> WorkloadReport {
    for i in 0..config.keys {
        db.put(key_for(i, config), value_for(i, config))
            .expect("failed to populate");
    }

    let misses = AtomicUsize::new(0);
    let per_thread = config.operations / config.threads;
    let start = Instant::now();

    thread::scope(|scope| {
        for t in 0..config.threads {
            let misses = &misses;
            scope.spawn(move || {
                for i in 0..per_thread {
                    let key = key_for(t * per_thread + i, config);
                    if db.get(&key).is_none() {
                        misses.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    WorkloadReport {
        attempted: per_thread * config.threads,
        failures: misses.load(Ordering::Relaxed),
        elapsed: start.elapsed(),
    }
}

/// Outcome of a commit race.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaceOutcome {
    /// Commits that published.
    pub successes: usize,
    /// Commits aborted on conflict.
    pub conflicts: usize,
    /// Commits that found the transaction already gone.
    pub not_found: usize,
}

/// Commits each transaction ID on its own thread, released together.
///
/// Every ID must already be staged. Panics on any error other than a
/// conflict or a missing transaction, so lock-ordering bugs surface as
/// test failures (or hangs) rather than silent misses.
pub fn run_commit_race(db: &Database, ids: &[&str]) -> RaceOutcome {
    let barrier = Barrier::new(ids.len());

    let results: Vec<Result<(), CoreError>> = thread::scope(|scope| {
        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    db.commit(id)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().expect("committer panicked"))
            .collect()
    });

    let mut outcome = RaceOutcome::default();
    for result in results {
        match result {
            Ok(()) => outcome.successes += 1,
            Err(CoreError::TransactionConflict { .. }) => outcome.conflicts += 1,
            Err(CoreError::TransactionNotFound { .. }) => outcome.not_found += 1,
            Err(e) => panic!("unexpected commit error: {e}"),
        }
    }
    outcome
}

/// Races `contenders` threads committing the same transaction ID.
pub fn run_same_id_commit_race(db: &Database, id: &str, contenders: usize) -> RaceOutcome {
    let ids: Vec<&str> = std::iter::repeat(id).take(contenders).collect();
    run_commit_race(db, &ids)
}
