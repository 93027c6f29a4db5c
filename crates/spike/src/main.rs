use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use neural_driver_core::agent::{AgentLoop, PlayerInput};
use neural_driver_core::config::{AgentSettings, ControlMode, NetworkConfig, TrainingMode};
use neural_driver_core::nn::MultilayerPerceptron;
use neural_driver_core::persistence::{self, BrainSource, DirStore};
use neural_driver_core::samples::{Sample, SampleStore};
use neural_driver_core::track::{Track, TrackConfig, WeavingDriver};
use neural_driver_core::train::train;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

const XOR_CASES: [([f32; 2], f32); 4] = [
    ([0.0, 0.0], 0.0),
    ([1.0, 1.0], 0.0),
    ([1.0, 0.0], 1.0),
    ([0.0, 1.0], 1.0),
];

#[derive(Parser)]
#[command(name = "neural-driver")]
#[command(about = "Neural network driving agent CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the default run configuration to stdout
    DumpDefaultConfig,
    /// Train a network offline on its recorded samples and save it
    Train {
        /// Path to run config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding brains/ and records/
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Epochs to run (default: configured offline epochs, else 10000)
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Drive the reference track with a restored or fresh network
    Drive {
        /// Path to run config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory holding brains/ and records/
        #[arg(long, default_value = "data")]
        data: PathBuf,

        /// Number of ticks to run
        #[arg(long, default_value_t = 2000)]
        ticks: usize,

        /// Tick interval between metric samples
        #[arg(long, default_value_t = 100)]
        sample_every: usize,

        /// Drive with the scripted weaving driver instead of the network
        #[arg(long)]
        player: bool,

        /// Record (input, output) pairs and save them on exit
        #[arg(long)]
        record: bool,

        /// Output directory for the run summary (optional)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Train the XOR demonstration network and print its truth table
    Xor {
        #[arg(long, default_value_t = 5000)]
        epochs: usize,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct RunConfig {
    agent: AgentSettings,
    track: TrackConfig,
}

impl RunConfig {
    fn load(path: Option<&Path>) -> Result<Self> {
        let config: RunConfig = match path {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open config file {}", path.display()))?;
                serde_json::from_reader(BufReader::new(file)).context("failed to parse config")?
            }
            None => RunConfig::default(),
        };
        config.agent.validate().context("agent config validation error")?;
        config.track.validate().context("track config validation error")?;
        Ok(config)
    }
}

fn run_train(config: RunConfig, data: &Path, epochs: Option<usize>) -> Result<()> {
    let mut store = DirStore::new(data);
    let identifier = config.agent.network.identifier.clone();
    let samples = persistence::load_samples(&store, &identifier)
        .with_context(|| format!("failed to load training data for '{identifier}'"))?;
    log::info!("loaded {} samples for '{identifier}'", samples.len());
    let epochs = epochs.unwrap_or(match config.agent.training {
        TrainingMode::Offline { epochs } => epochs,
        TrainingMode::Disabled | TrainingMode::Continuous => AgentSettings::DEFAULT_EPOCHS,
    });
    ensure!(epochs > 0, "epochs must be positive");

    let mut network = MultilayerPerceptron::seeded(config.agent.network.clone(), config.agent.seed)
        .context("invalid network config")?;
    let report = train(&mut network, &samples, epochs).context("training failed")?;
    persistence::save_network(&mut store, &network).context("failed to save network")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

struct DriveOptions {
    ticks: usize,
    sample_every: usize,
    player: bool,
    record: bool,
    out: Option<PathBuf>,
}

fn run_drive(mut config: RunConfig, data: &Path, opts: DriveOptions) -> Result<()> {
    if opts.player {
        config.agent.mode = ControlMode::PlayerControlled;
    }
    if opts.record {
        config.agent.recording = true;
    }
    let mut store = DirStore::new(data);
    let track = Track::try_new(config.track.clone()).context("failed to build track")?;
    let player: Option<Box<dyn PlayerInput + Send>> = match config.agent.mode {
        ControlMode::PlayerControlled => Some(Box::new(WeavingDriver::default())),
        ControlMode::NetworkControlled => None,
    };

    let mut agent = AgentLoop::from_store(config.agent.clone(), &store, track, player)
        .context("failed to initialize agent (network input_size must equal track rays)")?;
    let source = match agent.brain_source() {
        BrainSource::Restored => "restored",
        BrainSource::Fresh => "fresh",
    };
    println!(
        "Driving network '{}' ({source}) for {} ticks...",
        agent.network().config().identifier,
        opts.ticks
    );

    if let Some(report) = agent.start(&store).context("start-of-life training failed")? {
        println!(
            "Trained for {} epochs on {} samples (final cost {:.6})",
            report.epochs, report.samples, report.final_cost
        );
    }
    let summary = agent
        .try_run(opts.ticks, opts.sample_every)
        .context("run failed")?;
    agent.persist(&mut store).context("failed to persist agent")?;

    println!(
        "Run complete. Episodes: {}, crashes: {}, recorded samples: {}",
        summary.stats.episodes,
        agent.environment().crashes(),
        summary.stats.recorded_samples
    );
    if let Some(out_dir) = opts.out {
        std::fs::create_dir_all(&out_dir).context("failed to create output directory")?;
        let summary_path = out_dir.join("summary.json");
        let file = File::create(summary_path).context("failed to create summary file")?;
        serde_json::to_writer_pretty(file, &summary).context("failed to write summary")?;
        println!("Results saved to {:?}", out_dir);
    }
    Ok(())
}

fn run_xor(epochs: usize, seed: u64) -> Result<()> {
    let config = NetworkConfig {
        identifier: "xor".into(),
        input_size: 2,
        output_size: 1,
        hidden_layer_sizes: vec![3],
        learning_rate: 0.1,
        ..NetworkConfig::default()
    };
    let mut network = MultilayerPerceptron::seeded(config, seed).context("invalid xor config")?;
    let samples: SampleStore = XOR_CASES
        .iter()
        .map(|(input, target)| Sample::new(input.to_vec(), vec![*target]))
        .collect();
    let report = train(&mut network, &samples, epochs).context("xor training failed")?;

    println!("XOR after {} epochs (final cost {:.6}):", report.epochs, report.final_cost);
    for (input, target) in XOR_CASES {
        let out = network.feed_forward(&input)?[0];
        println!("  {input:?} -> {out:+.4} (target {target})");
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::DumpDefaultConfig => {
            let config = RunConfig::default();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Train {
            config,
            data,
            epochs,
        } => {
            let config = RunConfig::load(config.as_deref())?;
            run_train(config, &data, epochs)?;
        }
        Commands::Drive {
            config,
            data,
            ticks,
            sample_every,
            player,
            record,
            out,
        } => {
            let config = RunConfig::load(config.as_deref())?;
            run_drive(
                config,
                &data,
                DriveOptions {
                    ticks,
                    sample_every,
                    player,
                    record,
                    out,
                },
            )?;
        }
        Commands::Xor { epochs, seed } => run_xor(epochs, seed)?,
    }
    Ok(())
}
