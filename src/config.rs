use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};

/// Weights combined into the composite leaderboard score. Tunable via
/// environment so entity types can be re-weighted without a code change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub academic: f64,
    pub rewards: f64,
    pub attendance: f64,
    pub participation: f64,
    pub improvement: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            academic: 0.40,
            rewards: 0.15,
            attendance: 0.20,
            participation: 0.15,
            improvement: 0.10,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<()> {
        let parts = [
            ("academic", self.academic),
            ("rewards", self.rewards),
            ("attendance", self.attendance),
            ("participation", self.participation),
            ("improvement", self.improvement),
        ];
        for (name, value) in parts {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::Configuration(format!(
                    "weight {name} must be finite and non-negative, got {value}"
                )));
            }
        }
        let sum: f64 = parts.iter().map(|(_, v)| v).sum();
        if !(0.999..=1.001).contains(&sum) {
            return Err(PipelineError::Configuration(format!(
                "weights must sum to 1.0, got {sum:.4}"
            )));
        }
        Ok(())
    }
}

/// How mastery recompute weighs repeated attempts at the same cognitive level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyPolicy {
    /// Every attempt counts equally.
    SimpleMean,
    /// Attempt k of n weighs k; newer attempts never weigh less than older.
    Linear,
}

impl FromStr for RecencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple_mean" | "mean" => Ok(RecencyPolicy::SimpleMean),
            "linear" => Ok(RecencyPolicy::Linear),
            other => Err(format!("unknown recency policy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub weights: ScoringWeights,
    /// Months of history resolved into leaderboard windows.
    pub history_months: u32,
    /// Budget for a single handler invocation.
    pub handler_timeout: Duration,
    /// TTL for cached leaderboard reads.
    pub leaderboard_ttl: Duration,
    /// TTL for cached mastery reads.
    pub mastery_ttl: Duration,
    pub recency_policy: RecencyPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            history_months: 3,
            handler_timeout: Duration::from_secs(30),
            leaderboard_ttl: Duration::from_secs(300),
            mastery_ttl: Duration::from_secs(120),
            recency_policy: RecencyPolicy::SimpleMean,
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to defaults.
    /// Invalid weights are fatal here, before any event is dispatched.
    pub fn load() -> Result<Self> {
        let defaults = Config::default();
        let weights = ScoringWeights {
            academic: try_load("GP_WEIGHT_ACADEMIC", defaults.weights.academic)?,
            rewards: try_load("GP_WEIGHT_REWARDS", defaults.weights.rewards)?,
            attendance: try_load("GP_WEIGHT_ATTENDANCE", defaults.weights.attendance)?,
            participation: try_load("GP_WEIGHT_PARTICIPATION", defaults.weights.participation)?,
            improvement: try_load("GP_WEIGHT_IMPROVEMENT", defaults.weights.improvement)?,
        };
        weights.validate()?;

        let recency_policy = match env::var("GP_MASTERY_RECENCY") {
            Ok(raw) => raw.parse().map_err(PipelineError::Configuration)?,
            Err(_) => defaults.recency_policy,
        };

        let config = Config {
            weights,
            history_months: try_load("GP_HISTORY_MONTHS", defaults.history_months)?,
            handler_timeout: Duration::from_secs(try_load(
                "GP_HANDLER_TIMEOUT_SECS",
                defaults.handler_timeout.as_secs(),
            )?),
            leaderboard_ttl: Duration::from_secs(try_load(
                "GP_LEADERBOARD_TTL_SECS",
                defaults.leaderboard_ttl.as_secs(),
            )?),
            mastery_ttl: Duration::from_secs(try_load(
                "GP_MASTERY_TTL_SECS",
                defaults.mastery_ttl.as_secs(),
            )?),
            recency_policy,
        };
        info!(history_months = config.history_months, "configuration loaded");
        Ok(config)
    }
}

fn try_load<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|e| {
            PipelineError::Configuration(format!("invalid {key} value {raw:?}: {e}"))
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_are_valid() {
        assert!(ScoringWeights::default().validate().is_ok());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let weights = ScoringWeights {
            academic: -0.1,
            rewards: 0.5,
            attendance: 0.2,
            participation: 0.2,
            improvement: 0.2,
        };
        assert!(matches!(
            weights.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn weights_must_sum_to_one() {
        let weights = ScoringWeights {
            academic: 0.5,
            rewards: 0.5,
            attendance: 0.5,
            participation: 0.0,
            improvement: 0.0,
        };
        assert!(matches!(
            weights.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn nan_weight_is_rejected() {
        let weights = ScoringWeights {
            academic: f64::NAN,
            ..ScoringWeights::default()
        };
        assert!(weights.validate().is_err());
    }
}
