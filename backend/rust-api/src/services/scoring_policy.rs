use serde::Deserialize;

/// Maps correctness and latency to points. Implementations must never return
/// more than [`ScoringPolicy::max_award`].
pub trait ScoringPolicy: Send + Sync {
    fn award(&self, is_correct: bool, elapsed_ms: u64, duration_ms: u64) -> u64;

    fn max_award(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicyKind {
    LinearDecay,
    TimePenalty,
}

impl std::str::FromStr for ScoringPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear_decay" | "linear-decay" => Ok(ScoringPolicyKind::LinearDecay),
            "time_penalty" | "time-penalty" => Ok(ScoringPolicyKind::TimePenalty),
            other => Err(format!("unknown scoring policy '{}'", other)),
        }
    }
}

/// Fixed points for a correct answer plus a bonus that shrinks linearly from
/// `max_time_bonus` at zero elapsed time to nothing at the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearDecayPolicy {
    pub base_points: u64,
    pub max_time_bonus: u64,
}

impl Default for LinearDecayPolicy {
    fn default() -> Self {
        Self {
            base_points: 1000,
            max_time_bonus: 500,
        }
    }
}

impl ScoringPolicy for LinearDecayPolicy {
    fn award(&self, is_correct: bool, elapsed_ms: u64, duration_ms: u64) -> u64 {
        if !is_correct {
            return 0;
        }
        if duration_ms == 0 {
            return self.base_points;
        }
        let remaining = duration_ms.saturating_sub(elapsed_ms.min(duration_ms));
        let bonus = (self.max_time_bonus as u128 * remaining as u128 / duration_ms as u128) as u64;
        self.base_points.saturating_add(bonus)
    }

    fn max_award(&self) -> u64 {
        self.base_points.saturating_add(self.max_time_bonus)
    }
}

/// Fixed points minus a per-second penalty, floored at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePenaltyPolicy {
    pub base_points: u64,
    pub penalty_per_second: u64,
}

impl Default for TimePenaltyPolicy {
    fn default() -> Self {
        Self {
            base_points: 1000,
            penalty_per_second: 10,
        }
    }
}

impl ScoringPolicy for TimePenaltyPolicy {
    fn award(&self, is_correct: bool, elapsed_ms: u64, _duration_ms: u64) -> u64 {
        if !is_correct {
            return 0;
        }
        let penalty = elapsed_ms.saturating_mul(self.penalty_per_second) / 1000;
        self.base_points.saturating_sub(penalty)
    }

    fn max_award(&self) -> u64 {
        self.base_points
    }
}
