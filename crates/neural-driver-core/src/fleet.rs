//! Many independent agents ticked in parallel.

use crate::agent::{AgentError, AgentLoop, AgentStats, Environment, TickReport};
use crate::config::AgentSettings;
use crate::nn::MultilayerPerceptron;
use crate::persistence::BrainSource;
use crate::rng::derive_agent_rng;
use rayon::prelude::*;

/// A set of agents sharing nothing at runtime. Each owns its network, so
/// ticking them concurrently needs no synchronization.
pub struct Fleet<E> {
    agents: Vec<AgentLoop<E>>,
}

impl<E: Environment + Send> Fleet<E> {
    pub fn new(agents: Vec<AgentLoop<E>>) -> Self {
        Self { agents }
    }

    /// One fresh network per environment, each initialized from its own
    /// stream derived from `settings.seed`.
    pub fn seeded(settings: &AgentSettings, environments: Vec<E>) -> Result<Self, AgentError> {
        settings.validate()?;
        let agents = environments
            .into_iter()
            .enumerate()
            .map(|(index, env)| -> Result<AgentLoop<E>, AgentError> {
                let mut rng = derive_agent_rng(settings.seed, index);
                let network = MultilayerPerceptron::try_new(settings.network.clone(), &mut rng)?;
                AgentLoop::try_new(settings.clone(), network, BrainSource::Fresh, env, None)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { agents })
    }

    /// Independent copies of one network, e.g. a restored snapshot.
    pub fn cloned_from(
        settings: &AgentSettings,
        network: &MultilayerPerceptron,
        source: BrainSource,
        environments: Vec<E>,
    ) -> Result<Self, AgentError> {
        let agents = environments
            .into_iter()
            .map(|env| AgentLoop::try_new(settings.clone(), network.clone(), source, env, None))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { agents })
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn agents(&self) -> &[AgentLoop<E>] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [AgentLoop<E>] {
        &mut self.agents
    }

    pub fn into_agents(self) -> Vec<AgentLoop<E>> {
        self.agents
    }

    /// Tick every agent once. Agents whose episode ended are reset on this
    /// tick. Reports are in agent order.
    pub fn tick(&mut self) -> Result<Vec<TickReport>, AgentError> {
        self.agents
            .par_iter_mut()
            .map(|agent| {
                if agent.environment().episode_done() {
                    agent.signal_reset();
                }
                agent.tick()
            })
            .collect()
    }

    pub fn run(&mut self, ticks: usize) -> Result<AgentStats, AgentError> {
        for _ in 0..ticks {
            self.tick()?;
        }
        Ok(self.stats())
    }

    pub fn stats(&self) -> AgentStats {
        AgentStats::merge(self.agents.iter().map(|a| a.stats()))
    }
}
