use neural_driver_core::agent::{AgentError, AgentLoop};
use neural_driver_core::config::{AgentSettings, ControlMode, NetworkConfig, TrainingMode};
use neural_driver_core::nn::MlpError;
use neural_driver_core::persistence::{self, BrainSource, DirStore, MemoryStore};
use neural_driver_core::samples::{Sample, SampleStore};
use neural_driver_core::track::{Track, TrackConfig, WeavingDriver};
use std::path::PathBuf;

fn temp_root(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("neural-driver-{name}-{}", std::process::id()))
}

fn settings(recording: bool, training: TrainingMode) -> AgentSettings {
    AgentSettings {
        network: NetworkConfig {
            identifier: "lifecycle".into(),
            input_size: TrackConfig::default().rays,
            output_size: 2,
            hidden_layer_sizes: vec![6, 4],
            learning_rate: 0.05,
            ..NetworkConfig::default()
        },
        mode: ControlMode::NetworkControlled,
        recording,
        training,
        seed: 21,
    }
}

#[test]
fn record_train_restore_cycle_on_disk() {
    let root = temp_root("lifecycle");
    let _ = std::fs::remove_dir_all(&root);
    let mut store = DirStore::new(&root);

    // First life: a fresh network drives and records what it does.
    let mut recorder = AgentLoop::from_store(
        settings(true, TrainingMode::Disabled),
        &store,
        Track::new(TrackConfig::default()),
        None,
    )
    .expect("fresh agent");
    assert_eq!(recorder.brain_source(), BrainSource::Fresh);
    assert!(recorder.start(&store).expect("nothing to train").is_none());
    let summary = recorder.try_run(200, 50).expect("valid run");
    assert_eq!(summary.stats.recorded_samples, 200);
    recorder.persist(&mut store).expect("records saved");
    assert!(root.join("records").join("lifecycle.json").is_file());
    assert!(!root.join("brains").join("lifecycle.json").exists());

    // Second life: no brain on disk yet, so it trains offline on the records.
    let mut learner = AgentLoop::from_store(
        settings(false, TrainingMode::Offline { epochs: 30 }),
        &store,
        Track::new(TrackConfig::default()),
        None,
    )
    .expect("fresh agent");
    let report = learner
        .start(&store)
        .expect("records load")
        .expect("training ran");
    assert_eq!(report.samples, 200);
    assert_eq!(report.epochs, 30);
    learner.persist(&mut store).expect("brain saved");

    // Third life: the saved brain is restored and training is skipped.
    let mut restored = AgentLoop::from_store(
        settings(false, TrainingMode::Offline { epochs: 30 }),
        &store,
        Track::new(TrackConfig::default()),
        None,
    )
    .expect("restored agent");
    assert_eq!(restored.brain_source(), BrainSource::Restored);
    assert!(restored.start(&store).expect("start").is_none());
    assert_eq!(restored.network().weights(), learner.network().weights());
    assert_eq!(restored.network().biases(), learner.network().biases());

    let first = restored.tick().expect("tick");
    assert!(!first.trained);
    let mut twin = learner.network().clone();
    let mut probe = vec![0.0f32; TrackConfig::default().rays];
    neural_driver_core::agent::Environment::observe(
        &mut Track::new(TrackConfig::default()),
        &mut probe,
    );
    let expected = twin.feed_forward(&probe).expect("valid input").to_vec();
    assert_eq!(restored.last_action(), expected.as_slice());

    std::fs::remove_dir_all(&root).expect("cleanup temp dir");
}

#[test]
fn player_mode_drives_without_recording_or_training() {
    let mut store = MemoryStore::new();
    let corpus: SampleStore = vec![Sample::new(vec![0.5; 5], vec![0.1, 0.9]); 3].into();
    persistence::save_samples(&mut store, "lifecycle", &corpus).expect("seed corpus");
    let player_settings = AgentSettings {
        mode: ControlMode::PlayerControlled,
        ..settings(true, TrainingMode::Continuous)
    };
    let mut agent = AgentLoop::from_store(
        player_settings,
        &store,
        Track::new(TrackConfig::default()),
        Some(Box::new(WeavingDriver::default())),
    )
    .expect("player agent");
    let summary = agent.try_run(300, 100).expect("valid run");
    assert_eq!(summary.stats.recorded_samples, 0);
    assert_eq!(summary.stats.continuous_training_steps, 0);
    assert!(agent.environment().distance() > 0.0 || agent.environment().crashes() > 0);

    agent.persist(&mut store).expect("persist");
    // Player mode records nothing, so the stored corpus is left as it was.
    assert_eq!(
        persistence::load_samples(&store, "lifecycle").expect("corpus kept"),
        corpus
    );
    assert!(persistence::load_network(&store, "lifecycle")
        .expect_err("untrained brain is not saved")
        .is_not_found());
}

#[test]
fn track_refuses_network_of_other_width() {
    let store = MemoryStore::new();
    let mut wide = settings(true, TrainingMode::Disabled);
    wide.network.input_size = TrackConfig::default().rays + 4;
    let err = AgentLoop::from_store(wide, &store, Track::new(TrackConfig::default()), None)
        .err()
        .expect("9 inputs cannot be fed by 5 rays");
    assert!(matches!(
        err,
        AgentError::Network(MlpError::ShapeMismatch {
            what: "observation",
            got: 5,
            expected: 9,
        })
    ));
}
