use super::AgentLoop;
use super::Environment;
use serde::{Deserialize, Serialize};

/// Outcome of a single [`AgentLoop::tick`].
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TickReport {
    /// Zero-based index of this tick over the agent's life.
    pub tick: usize,
    /// Zero-based index of this tick within the current episode.
    pub episode_tick: usize,
    pub recorded: bool,
    pub trained: bool,
    /// An episode reset was handled at the end of this tick.
    pub reset: bool,
}

/// Running totals over an agent's life.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentStats {
    pub ticks: usize,
    /// Completed episodes, i.e. handled resets.
    pub episodes: usize,
    pub recorded_samples: usize,
    pub continuous_training_steps: usize,
    pub offline_epochs: usize,
    /// Cost of the most recent backpropagation step, 0 before any training.
    pub last_cost: f32,
}

impl AgentStats {
    /// Fold per-agent totals into one fleet-wide view. `last_cost` becomes the
    /// mean over agents.
    pub fn merge<'a>(stats: impl IntoIterator<Item = &'a AgentStats>) -> AgentStats {
        let mut merged = AgentStats::default();
        let mut count = 0usize;
        for s in stats {
            merged.ticks += s.ticks;
            merged.episodes += s.episodes;
            merged.recorded_samples += s.recorded_samples;
            merged.continuous_training_steps += s.continuous_training_steps;
            merged.offline_epochs += s.offline_epochs;
            merged.last_cost += s.last_cost;
            count += 1;
        }
        if count > 0 {
            merged.last_cost /= count as f32;
        }
        merged
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TickMetrics {
    pub tick: usize,
    pub episode: usize,
    pub episode_tick: usize,
    /// Mean of the action vector sent to the environment.
    pub action_mean: f32,
    /// Largest absolute action component.
    pub action_max_abs: f32,
    pub recorded_samples: usize,
    pub last_cost: f32,
}

fn default_schema_version() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub identifier: String,
    pub ticks: usize,
    pub sample_every: usize,
    pub samples: Vec<TickMetrics>,
    #[serde(default)]
    pub episode_lengths: Vec<usize>,
    pub stats: AgentStats,
}

impl<E: Environment> AgentLoop<E> {
    pub(crate) fn collect_tick_metrics(&self, report: &TickReport) -> TickMetrics {
        let action = self.last_action();
        let denom = action.len().max(1) as f32;
        TickMetrics {
            tick: report.tick,
            episode: self.stats.episodes,
            episode_tick: report.episode_tick,
            action_mean: action.iter().sum::<f32>() / denom,
            action_max_abs: action.iter().fold(0.0f32, |m, v| m.max(v.abs())),
            recorded_samples: self.samples.len(),
            last_cost: self.stats.last_cost,
        }
    }
}
