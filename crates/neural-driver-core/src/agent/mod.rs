pub mod metrics;

pub use metrics::*;

use crate::config::{AgentSettings, ConfigError, ControlMode, TrainingMode};
use crate::nn::{MlpError, MultilayerPerceptron};
use crate::persistence::{self, BlobStore, BrainSource, PersistenceError};
use crate::rng::create_rng;
use crate::samples::SampleStore;
use crate::train::{self, TrainError, TrainReport};
use std::{error::Error, fmt};

/// The world an agent senses and acts in.
pub trait Environment {
    /// Write the current observation. The buffer is exactly `input_size` long.
    fn observe(&mut self, input: &mut [f32]);

    /// Fixed number of values `observe` produces, when the environment has
    /// one. Agents refuse networks whose `input_size` differs.
    fn observation_len(&self) -> Option<usize> {
        None
    }

    /// Apply an action of `output_size` values.
    fn actuate(&mut self, output: &[f32]);

    /// Return to the start of a new episode. Called once per handled reset.
    fn on_reset(&mut self);

    /// Whether the current episode has ended on its own (a crash, a finish
    /// line). [`AgentLoop::try_run`] turns this into a reset signal.
    fn episode_done(&self) -> bool {
        false
    }
}

/// Direct control of the action vector, bypassing the network.
pub trait PlayerInput {
    /// Overwrite the whole action buffer (`output_size` values).
    fn fill(&mut self, output: &mut [f32]);
}

impl<F: FnMut(&mut [f32])> PlayerInput for F {
    fn fill(&mut self, output: &mut [f32]) {
        self(output)
    }
}

#[derive(Debug)]
pub enum AgentError {
    Config(ConfigError),
    /// Player-controlled mode without a player input provider.
    MissingPlayerInput,
    InvalidSampleEvery,
    TooManyTicks { max: usize, actual: usize },
    Network(MlpError),
    Persistence(PersistenceError),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::Config(e) => write!(f, "{e}"),
            AgentError::MissingPlayerInput => {
                write!(f, "player-controlled mode requires a player input provider")
            }
            AgentError::InvalidSampleEvery => write!(f, "sample_every must be positive"),
            AgentError::TooManyTicks { max, actual } => {
                write!(f, "ticks ({actual}) exceed supported maximum ({max})")
            }
            AgentError::Network(e) => write!(f, "{e}"),
            AgentError::Persistence(e) => write!(f, "{e}"),
        }
    }
}

impl From<ConfigError> for AgentError {
    fn from(err: ConfigError) -> Self {
        AgentError::Config(err)
    }
}

impl From<MlpError> for AgentError {
    fn from(err: MlpError) -> Self {
        AgentError::Network(err)
    }
}

impl From<PersistenceError> for AgentError {
    fn from(err: PersistenceError) -> Self {
        AgentError::Persistence(err)
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AgentError::Config(e) => Some(e),
            AgentError::Network(e) => Some(e),
            AgentError::Persistence(e) => Some(e),
            AgentError::MissingPlayerInput
            | AgentError::InvalidSampleEvery
            | AgentError::TooManyTicks { .. } => None,
        }
    }
}

/// Per-tick driver tying one network to one environment.
///
/// The network's own configuration decides buffer widths and the persistence
/// identifier; `settings.network` is only used when building a fresh network
/// in [`AgentLoop::from_store`].
pub struct AgentLoop<E> {
    settings: AgentSettings,
    network: MultilayerPerceptron,
    brain_source: BrainSource,
    environment: E,
    player: Option<Box<dyn PlayerInput + Send>>,
    samples: SampleStore,
    input: Vec<f32>,
    output: Vec<f32>,
    tick_index: usize,
    episode_tick: usize,
    reset_pending: bool,
    /// Parameters changed during this life and should be saved.
    trained: bool,
    stats: AgentStats,
}

impl<E: Environment> AgentLoop<E> {
    pub const MAX_RUN_TICKS: usize = 10_000_000;

    pub fn new(
        settings: AgentSettings,
        network: MultilayerPerceptron,
        brain_source: BrainSource,
        environment: E,
        player: Option<Box<dyn PlayerInput + Send>>,
    ) -> Self {
        Self::try_new(settings, network, brain_source, environment, player)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(
        settings: AgentSettings,
        network: MultilayerPerceptron,
        brain_source: BrainSource,
        environment: E,
        player: Option<Box<dyn PlayerInput + Send>>,
    ) -> Result<Self, AgentError> {
        settings.validate()?;
        if settings.mode == ControlMode::PlayerControlled && player.is_none() {
            return Err(AgentError::MissingPlayerInput);
        }
        if let Some(width) = environment.observation_len() {
            if width != network.input_size() {
                return Err(MlpError::ShapeMismatch {
                    what: "observation",
                    got: width,
                    expected: network.input_size(),
                }
                .into());
            }
        }
        let input = vec![0.0; network.input_size()];
        let output = vec![0.0; network.output_size()];
        Ok(Self {
            settings,
            network,
            brain_source,
            environment,
            player,
            samples: SampleStore::new(),
            input,
            output,
            tick_index: 0,
            episode_tick: 0,
            reset_pending: false,
            trained: false,
            stats: AgentStats::default(),
        })
    }

    /// Restore the network saved under `settings.network.identifier`, or
    /// initialize a fresh one from `settings.seed` when nothing is stored.
    pub fn from_store<S: BlobStore + ?Sized>(
        settings: AgentSettings,
        store: &S,
        environment: E,
        player: Option<Box<dyn PlayerInput + Send>>,
    ) -> Result<Self, AgentError> {
        settings.validate()?;
        let mut rng = create_rng(settings.seed);
        let (network, source) = persistence::load_or_init(store, &settings.network, &mut rng)?;
        Self::try_new(settings, network, source, environment, player)
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn network(&self) -> &MultilayerPerceptron {
        &self.network
    }

    pub fn brain_source(&self) -> BrainSource {
        self.brain_source
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn environment_mut(&mut self) -> &mut E {
        &mut self.environment
    }

    pub fn samples(&self) -> &SampleStore {
        &self.samples
    }

    /// Replace the recorded corpus, e.g. to continue an earlier recording.
    pub fn set_samples(&mut self, samples: SampleStore) {
        self.samples = samples;
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// The action vector produced by the most recent tick.
    pub fn last_action(&self) -> &[f32] {
        &self.output
    }

    pub fn into_parts(self) -> (MultilayerPerceptron, E, SampleStore) {
        (self.network, self.environment, self.samples)
    }

    /// Start-of-life sequence. A restored network never trains again; a fresh
    /// one with offline training loads its recorded corpus and trains on it.
    pub fn start<S: BlobStore + ?Sized>(
        &mut self,
        store: &S,
    ) -> Result<Option<TrainReport>, AgentError> {
        let identifier = self.network.config().identifier.clone();
        if self.brain_source == BrainSource::Restored {
            if self.settings.training != TrainingMode::Disabled {
                log::info!("network '{identifier}' restored from storage, training disabled");
            }
            self.settings.training = TrainingMode::Disabled;
            return Ok(None);
        }
        if !matches!(self.settings.training, TrainingMode::Offline { .. }) {
            return Ok(None);
        }
        let corpus = match persistence::load_samples(store, &identifier) {
            Ok(corpus) => Some(corpus),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        self.train_offline(corpus.as_ref())
    }

    /// Run offline epochs over `corpus`. Without a corpus, training is skipped
    /// and the current parameters are kept.
    ///
    /// Uses the configured epoch count, or [`AgentSettings::DEFAULT_EPOCHS`]
    /// when offline training is not the configured mode.
    pub fn train_offline(
        &mut self,
        corpus: Option<&SampleStore>,
    ) -> Result<Option<TrainReport>, AgentError> {
        let Some(corpus) = corpus else {
            log::warn!(
                "network '{}': {}",
                self.network.config().identifier,
                TrainError::MissingTrainingData
            );
            return Ok(None);
        };
        let epochs = match self.settings.training {
            TrainingMode::Offline { epochs } => epochs,
            TrainingMode::Disabled | TrainingMode::Continuous => AgentSettings::DEFAULT_EPOCHS,
        };
        let report = train::train(&mut self.network, corpus, epochs)?;
        self.trained = true;
        self.stats.offline_epochs += report.epochs;
        self.stats.last_cost = report.final_cost;
        if matches!(self.settings.training, TrainingMode::Offline { .. }) {
            self.settings.training = TrainingMode::Disabled;
        }
        Ok(Some(report))
    }

    /// Request an episode reset. Handled once at the end of the next tick,
    /// however many times it is signalled before then.
    pub fn signal_reset(&mut self) {
        self.reset_pending = true;
    }

    pub fn tick(&mut self) -> Result<TickReport, AgentError> {
        let mut recorded = false;
        let mut trained = false;

        match self.settings.mode {
            ControlMode::PlayerControlled => {
                let player = self
                    .player
                    .as_mut()
                    .ok_or(AgentError::MissingPlayerInput)?;
                player.fill(&mut self.output);
            }
            ControlMode::NetworkControlled => {
                self.environment.observe(&mut self.input);
                let action = self.network.feed_forward(&self.input)?;
                self.output.copy_from_slice(action);

                if self.settings.recording {
                    self.samples.record(&self.input, &self.output);
                    self.stats.recorded_samples += 1;
                    recorded = true;
                }
                if self.settings.training == TrainingMode::Continuous {
                    self.stats.last_cost =
                        self.network.back_propagate(&self.input, &self.output)?;
                    self.stats.continuous_training_steps += 1;
                    self.trained = true;
                    trained = true;
                }
            }
        }

        self.environment.actuate(&self.output);

        let report_tick = self.tick_index;
        let report_episode_tick = self.episode_tick;
        self.tick_index += 1;
        self.episode_tick += 1;
        self.stats.ticks += 1;

        let reset = std::mem::take(&mut self.reset_pending);
        if reset {
            self.environment.on_reset();
            self.episode_tick = 0;
            self.stats.episodes += 1;
        }

        Ok(TickReport {
            tick: report_tick,
            episode_tick: report_episode_tick,
            recorded,
            trained,
            reset,
        })
    }

    pub fn run(&mut self, ticks: usize, sample_every: usize) -> RunSummary {
        self.try_run(ticks, sample_every)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Tick `ticks` times, signalling a reset whenever the environment reports
    /// its episode as done, and sample metrics every `sample_every` ticks.
    pub fn try_run(&mut self, ticks: usize, sample_every: usize) -> Result<RunSummary, AgentError> {
        if sample_every == 0 {
            return Err(AgentError::InvalidSampleEvery);
        }
        if ticks > Self::MAX_RUN_TICKS {
            return Err(AgentError::TooManyTicks {
                max: Self::MAX_RUN_TICKS,
                actual: ticks,
            });
        }
        let mut samples = Vec::with_capacity(ticks / sample_every + 1);
        let mut episode_lengths = Vec::new();

        for n in 1..=ticks {
            if self.environment.episode_done() {
                self.signal_reset();
            }
            let report = self.tick()?;
            if report.reset {
                episode_lengths.push(report.episode_tick + 1);
            }
            if n % sample_every == 0 || n == ticks {
                samples.push(self.collect_tick_metrics(&report));
            }
        }

        Ok(RunSummary {
            schema_version: 1,
            identifier: self.network.config().identifier.clone(),
            ticks,
            sample_every,
            samples,
            episode_lengths,
            stats: self.stats.clone(),
        })
    }

    /// Save the recorded corpus when recording under network control, and the
    /// network when its parameters changed during this life.
    ///
    /// Player mode records nothing, so it leaves any stored corpus alone.
    pub fn persist<S: BlobStore + ?Sized>(&self, store: &mut S) -> Result<(), AgentError> {
        let identifier = &self.network.config().identifier;
        if self.settings.recording && self.settings.mode == ControlMode::NetworkControlled {
            persistence::save_samples(store, identifier, &self.samples)?;
        }
        if self.trained {
            persistence::save_network(store, &self.network)?;
        }
        Ok(())
    }
}
