//! Time management.
//!
//! Converts the `go` parameters into a soft and a hard limit. The hard
//! limit is polled inside the search every couple of thousand nodes; the
//! soft limit is only consulted between iterations, where it is scaled
//! by how much effort went into the best move, how stable that move has
//! been, and how much the score is swinging.

/// Limits and mode flags for one search
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchLimits {
    pub wtime: Option<u64>,
    pub btime: Option<u64>,
    pub winc: Option<u64>,
    pub binc: Option<u64>,
    pub movestogo: Option<u64>,
    pub movetime: Option<u64>,
    pub depth: Option<i32>,
    pub nodes: Option<u64>,
    pub infinite: bool,
    /// I/O latency allowance, from the MoveOverhead option
    pub overhead_ms: Option<u64>,
}

/// Soft and hard time budgets in milliseconds; `None` means untimed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBudget {
    pub soft_ms: Option<u64>,
    pub hard_ms: Option<u64>,
}

/// Safety margin subtracted for I/O latency
const DEFAULT_OVERHEAD_MS: u64 = 10;

impl SearchLimits {
    /// Compute the time budget for the side to move
    #[must_use]
    pub fn budget(&self, white_to_move: bool) -> TimeBudget {
        if self.infinite {
            return TimeBudget {
                soft_ms: None,
                hard_ms: None,
            };
        }
        if let Some(movetime) = self.movetime {
            return TimeBudget {
                soft_ms: Some(movetime),
                hard_ms: Some(movetime),
            };
        }

        let remaining = if white_to_move { self.wtime } else { self.btime };
        let Some(remaining) = remaining else {
            // Depth- or node-limited search with no clock
            return TimeBudget {
                soft_ms: None,
                hard_ms: None,
            };
        };
        let inc = if white_to_move { self.winc } else { self.binc }.unwrap_or(0);
        let overhead = self.overhead_ms.unwrap_or(DEFAULT_OVERHEAD_MS);
        let usable = remaining.saturating_sub(overhead).max(1);

        let (soft, hard) = match self.movestogo {
            Some(movestogo) if movestogo > 0 => {
                let soft = usable * 9 / (10 * movestogo) + inc / 2;
                let hard = usable * 9 / (10 * movestogo.div_euclid(2).max(1)) + inc;
                (soft, hard)
            }
            _ => {
                // Sudden death
                let soft = usable / 20 + inc / 2;
                let hard = usable / 5 + inc;
                (soft, hard)
            }
        };

        TimeBudget {
            soft_ms: Some(soft.min(usable).max(1)),
            hard_ms: Some(hard.min(usable).max(1)),
        }
    }
}

/// Per-iteration scaling of the soft limit
#[must_use]
pub fn scaled_soft_limit(
    soft_ms: u64,
    best_move_effort_permille: u64,
    stability: u32,
    score_swing: i32,
) -> u64 {
    let mut scaled = soft_ms;

    // A best move that soaked up most of the nodes is probably forced
    scaled = scaled * (1500 - best_move_effort_permille.min(800)) / 1000;

    // An unchanged best move needs less confirmation
    if stability >= 6 {
        scaled = scaled * 70 / 100;
    } else if stability >= 3 {
        scaled = scaled * 85 / 100;
    } else if stability == 0 {
        scaled = scaled * 125 / 100;
    }

    // Large score swings deserve a longer look
    if score_swing.abs() > 30 {
        scaled = scaled * 135 / 100;
    }

    scaled.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movetime_is_both_limits() {
        let limits = SearchLimits {
            movetime: Some(500),
            ..Default::default()
        };
        let budget = limits.budget(true);
        assert_eq!(budget.soft_ms, Some(500));
        assert_eq!(budget.hard_ms, Some(500));
    }

    #[test]
    fn test_infinite_has_no_limits() {
        let limits = SearchLimits {
            infinite: true,
            wtime: Some(1000),
            ..Default::default()
        };
        let budget = limits.budget(true);
        assert_eq!(budget.soft_ms, None);
        assert_eq!(budget.hard_ms, None);
    }

    #[test]
    fn test_sudden_death_fractions() {
        let limits = SearchLimits {
            wtime: Some(60_000),
            winc: Some(1000),
            overhead_ms: Some(0),
            ..Default::default()
        };
        let budget = limits.budget(true);
        assert_eq!(budget.soft_ms, Some(60_000 / 20 + 500));
        assert_eq!(budget.hard_ms, Some(60_000 / 5 + 1000));
    }

    #[test]
    fn test_movestogo_budget() {
        let limits = SearchLimits {
            btime: Some(30_000),
            movestogo: Some(10),
            overhead_ms: Some(0),
            ..Default::default()
        };
        let budget = limits.budget(false);
        assert_eq!(budget.soft_ms, Some(30_000 * 9 / 100));
        assert_eq!(budget.hard_ms, Some(30_000 * 9 / 50));
    }

    #[test]
    fn test_budget_never_exceeds_remaining() {
        let limits = SearchLimits {
            wtime: Some(50),
            winc: Some(10_000),
            overhead_ms: Some(10),
            ..Default::default()
        };
        let budget = limits.budget(true);
        assert!(budget.hard_ms.unwrap() <= 50);
        assert!(budget.soft_ms.unwrap() >= 1);
    }

    #[test]
    fn test_soft_scaling_directions() {
        let base = 1000;
        // Heavy effort on the best move shortens the budget
        assert!(scaled_soft_limit(base, 700, 1, 0) < scaled_soft_limit(base, 100, 1, 0));
        // Stability shortens, instability lengthens
        assert!(scaled_soft_limit(base, 0, 7, 0) < scaled_soft_limit(base, 0, 1, 0));
        assert!(scaled_soft_limit(base, 0, 0, 0) > scaled_soft_limit(base, 0, 1, 0));
        // Swinging scores lengthen
        assert!(scaled_soft_limit(base, 0, 1, 80) > scaled_soft_limit(base, 0, 1, 0));
    }
}
