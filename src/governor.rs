//! Resource governor: enforces memory/time/file-count ceilings and
//! derives adaptive batch sizes.
//!
//! The governor is purely observational. Callers feed it a
//! [`ResourceUsage`] snapshot at every batch boundary; it answers with
//! [`BudgetStatus`] and never mutates anything itself.

use crate::core::config::BudgetConfig;
use crate::core::error::ResourceKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest batch the governor will ever hand out.
pub const MIN_BATCH_SIZE: usize = 100;
/// Hard cap on batch size regardless of headroom.
pub const MAX_BATCH_SIZE: usize = 500;

/// Live usage snapshot supplied by the caller at a batch boundary.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Current process memory usage in bytes
    pub memory_bytes: u64,
    /// Wall-clock time elapsed since the run (or resumption) started
    pub elapsed_secs: u64,
    /// Files processed so far in this run
    pub files_processed: u64,
    /// Database rows processed so far in this run
    pub rows_processed: u64,
}

impl ResourceUsage {
    /// Snapshot current process memory from `/proc/self/statm`. Falls
    /// back to zero where the proc filesystem is unavailable, which
    /// makes the memory ceiling effectively advisory there.
    pub fn sample(elapsed: Duration, files_processed: u64) -> Self {
        Self {
            memory_bytes: process_rss_bytes().unwrap_or(0),
            elapsed_secs: elapsed.as_secs(),
            files_processed,
            rows_processed: 0,
        }
    }
}

/// Outcome of a budget check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStatus {
    /// All budgets have headroom
    Ok,
    /// Past the warning band for one budget; caller should shed
    /// whatever transient state it can, but the batch continues
    Warning(ResourceKind),
    /// A ceiling was crossed; caller must persist its cursor and stop
    Exceeded(ResourceKind),
}

impl BudgetStatus {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, BudgetStatus::Exceeded(_))
    }
}

/// Tracks usage against configured ceilings and sizes batches.
#[derive(Debug, Clone)]
pub struct ResourceGovernor {
    budget: BudgetConfig,
    /// Rows ceiling; unused by the file engine but kept for callers
    /// that feed database batches through the same governor.
    max_rows: u64,
}

impl ResourceGovernor {
    pub fn new(budget: BudgetConfig) -> Self {
        Self {
            budget,
            max_rows: u64::MAX,
        }
    }

    /// Set a database-row ceiling for callers that process rows.
    pub fn with_row_limit(mut self, max_rows: u64) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.budget.max_file_size_bytes
    }

    /// Check the given usage against every ceiling. Ceilings are
    /// checked in a fixed order (memory, time, files, rows) so the
    /// reported kind is deterministic when several are breached at once.
    pub fn check_budget(&self, usage: &ResourceUsage) -> BudgetStatus {
        let checks = [
            (
                ResourceKind::Memory,
                usage.memory_bytes,
                self.budget.memory_ceiling_bytes,
            ),
            (
                ResourceKind::Time,
                usage.elapsed_secs,
                self.budget.time_ceiling_secs,
            ),
            (
                ResourceKind::FileCount,
                usage.files_processed,
                self.budget.max_files_per_run,
            ),
            (ResourceKind::DbRows, usage.rows_processed, self.max_rows),
        ];

        for (kind, current, ceiling) in checks {
            if current >= ceiling {
                return BudgetStatus::Exceeded(kind);
            }
        }

        for (kind, current, ceiling) in checks {
            let warn_at = (ceiling as f64 * self.budget.warning_fraction) as u64;
            if current >= warn_at {
                log::debug!(
                    "resource warning: {} at {}/{} ({}%)",
                    kind,
                    current,
                    ceiling,
                    current * 100 / ceiling.max(1)
                );
                return BudgetStatus::Warning(kind);
            }
        }

        BudgetStatus::Ok
    }

    /// Compute the batch size for the next batch. Shrinks linearly from
    /// [`MAX_BATCH_SIZE`] toward [`MIN_BATCH_SIZE`] as memory usage
    /// approaches the ceiling; non-increasing in memory usage.
    pub fn optimal_batch_size(&self, usage: &ResourceUsage) -> usize {
        let ceiling = self.budget.memory_ceiling_bytes.max(1);
        let used = usage.memory_bytes.min(ceiling);
        let headroom = (ceiling - used) as f64 / ceiling as f64;

        let span = (MAX_BATCH_SIZE - MIN_BATCH_SIZE) as f64;
        let size = MIN_BATCH_SIZE + (span * headroom) as usize;
        size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
    }
}

/// Read resident set size from `/proc/self/statm`, in bytes.
#[cfg(target_os = "linux")]
fn process_rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(rss_pages * 4096)
}

#[cfg(not(target_os = "linux"))]
fn process_rss_bytes() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(memory: u64, elapsed: u64, files: u64) -> ResourceUsage {
        ResourceUsage {
            memory_bytes: memory,
            elapsed_secs: elapsed,
            files_processed: files,
            rows_processed: 0,
        }
    }

    fn governor() -> ResourceGovernor {
        ResourceGovernor::new(BudgetConfig::default())
    }

    #[test]
    fn test_budget_ok_when_idle() {
        let status = governor().check_budget(&usage(0, 0, 0));
        assert_eq!(status, BudgetStatus::Ok);
    }

    #[test]
    fn test_time_ceiling_exceeded() {
        let status = governor().check_budget(&usage(0, 180, 0));
        assert_eq!(status, BudgetStatus::Exceeded(ResourceKind::Time));
    }

    #[test]
    fn test_file_count_ceiling_exceeded() {
        let status = governor().check_budget(&usage(0, 0, 5000));
        assert_eq!(status, BudgetStatus::Exceeded(ResourceKind::FileCount));
    }

    #[test]
    fn test_warning_band_before_ceiling() {
        // 80% of 180s
        let status = governor().check_budget(&usage(0, 150, 0));
        assert_eq!(status, BudgetStatus::Warning(ResourceKind::Time));
        assert!(!status.is_exceeded());
    }

    #[test]
    fn test_memory_checked_before_time() {
        let ceiling = BudgetConfig::default().memory_ceiling_bytes;
        let status = governor().check_budget(&usage(ceiling, 999, 0));
        assert_eq!(status, BudgetStatus::Exceeded(ResourceKind::Memory));
    }

    #[test]
    fn test_batch_size_monotonic_in_memory() {
        let gov = governor();
        let ceiling = BudgetConfig::default().memory_ceiling_bytes;

        let mut last = usize::MAX;
        for step in 0..=10 {
            let mem = ceiling * step / 10;
            let size = gov.optimal_batch_size(&usage(mem, 0, 0));
            assert!(size <= last, "batch size grew as memory rose");
            assert!((MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size));
            last = size;
        }
    }

    #[test]
    fn test_batch_size_floor_at_ceiling() {
        let gov = governor();
        let ceiling = BudgetConfig::default().memory_ceiling_bytes;
        assert_eq!(gov.optimal_batch_size(&usage(ceiling, 0, 0)), MIN_BATCH_SIZE);
        assert_eq!(
            gov.optimal_batch_size(&usage(ceiling * 2, 0, 0)),
            MIN_BATCH_SIZE
        );
    }

    #[test]
    fn test_batch_size_cap_when_idle() {
        assert_eq!(governor().optimal_batch_size(&usage(0, 0, 0)), MAX_BATCH_SIZE);
    }

    #[test]
    fn test_row_limit() {
        let gov = governor().with_row_limit(1000);
        let status = gov.check_budget(&ResourceUsage {
            rows_processed: 1000,
            ..Default::default()
        });
        assert_eq!(status, BudgetStatus::Exceeded(ResourceKind::DbRows));
    }
}
