//! Global deadline tracking for a single run.
//!
//! A [`BudgetTracker`] is created when a run starts and divides the remaining
//! wall-clock budget across stages. It reads `tokio::time::Instant`, so tests
//! running on a paused runtime observe deterministic elapsed time.

use crate::config::{saturating_duration, BudgetConfig};
use std::time::Duration;
use tokio::time::Instant;

/// Tracks elapsed time against the run's total budget.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    started: Instant,
    total_budget: Duration,
    default_stage_timeout: Duration,
    floor: Duration,
    config: BudgetConfig,
}

impl BudgetTracker {
    /// Starts tracking now.
    #[must_use]
    pub fn start(config: &BudgetConfig) -> Self {
        Self::start_at(config, Instant::now())
    }

    /// Starts tracking from an explicit instant.
    #[must_use]
    pub fn start_at(config: &BudgetConfig, started: Instant) -> Self {
        Self {
            started,
            total_budget: config.total_budget(),
            default_stage_timeout: config.stage_timeout_base(),
            floor: config.floor(),
            config: config.clone(),
        }
    }

    /// Time elapsed since the run started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// The timeout floor.
    #[must_use]
    pub fn floor(&self) -> Duration {
        self.floor
    }

    /// Remaining budget, never below the floor.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.total_budget
            .saturating_sub(self.elapsed())
            .max(self.floor)
    }

    /// Returns true once the remaining budget has collapsed to the floor.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() <= self.floor
    }

    /// Timeout for a stage: the multiplied default, clamped to the remaining budget.
    #[must_use]
    pub fn stage_timeout(&self, stage: &str) -> Duration {
        let multiplier = self.config.multiplier(stage).max(0.0);
        let multiplied =
            saturating_duration(self.default_stage_timeout.as_secs_f64() * multiplier);
        // remaining() is already floored, so the clamp keeps the floor too.
        multiplied.max(self.floor).min(self.remaining())
    }

    /// Whether another refine iteration may start.
    #[must_use]
    pub fn has_refine_budget(&self, refine_floor: Duration) -> bool {
        self.remaining() > refine_floor
    }

    /// Whether an optional stage should be skipped rather than attempted.
    ///
    /// True when the remaining budget is at or below `min_budget` (or the
    /// floor, whichever is larger).
    #[must_use]
    pub fn should_skip_optional(&self, min_budget: Duration) -> bool {
        self.remaining() <= min_budget.max(self.floor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(total: f64, default_timeout: f64) -> BudgetConfig {
        BudgetConfig::default()
            .with_total_budget(total)
            .with_default_stage_timeout(default_timeout)
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let tracker = BudgetTracker::start(&config(100.0, 10.0));
        assert_eq!(tracker.remaining(), Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(tracker.remaining(), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_never_below_floor() {
        let tracker = BudgetTracker::start(&config(5.0, 10.0));
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(tracker.remaining(), Duration::from_millis(100));
        assert!(tracker.is_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_uses_multiplier() {
        let tracker = BudgetTracker::start(&config(900.0, 180.0));
        assert_eq!(tracker.stage_timeout("architecture"), Duration::from_secs(270));
        assert_eq!(tracker.stage_timeout("review"), Duration::from_secs(180));
        assert_eq!(tracker.stage_timeout("unconfigured"), Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_clamped_by_budget() {
        let cfg = config(5.0, 180.0).with_multiplier("design", 1.5);
        let tracker = BudgetTracker::start(&cfg);
        assert_eq!(tracker.stage_timeout("design"), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_timeout_bounds_hold_through_run() {
        let cfg = config(30.0, 7.0).with_multiplier("big", 3.0).with_multiplier("zero", 0.0);
        let tracker = BudgetTracker::start(&cfg);

        for _ in 0..40 {
            for stage in ["big", "zero", "review", "other"] {
                let timeout = tracker.stage_timeout(stage);
                assert!(timeout <= tracker.remaining());
                assert!(timeout >= tracker.floor());
            }
            tokio::time::advance(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_config_saturates() {
        let cfg = config(1e20, 1e300).with_multiplier("design", 1e300);
        let tracker = BudgetTracker::start(&cfg);

        assert_eq!(tracker.remaining(), Duration::MAX);
        assert_eq!(tracker.stage_timeout("design"), Duration::MAX);
        assert!(!tracker.is_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refine_budget_is_strict() {
        let tracker = BudgetTracker::start(&config(20.0, 10.0));
        assert!(tracker.has_refine_budget(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!tracker.has_refine_budget(Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_optional_stage_skipped_when_budget_collapsed() {
        let tracker = BudgetTracker::start(&config(5.0, 10.0));
        assert!(!tracker.should_skip_optional(Duration::ZERO));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(tracker.should_skip_optional(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_optional_stage_min_budget() {
        let tracker = BudgetTracker::start(&config(30.0, 10.0));
        assert!(!tracker.should_skip_optional(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(21)).await;
        assert!(tracker.should_skip_optional(Duration::from_secs(10)));
    }
}
