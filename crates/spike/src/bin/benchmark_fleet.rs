use neural_driver_core::agent::Environment;
use neural_driver_core::config::{AgentSettings, NetworkConfig, TrainingMode};
use neural_driver_core::fleet::Fleet;
use neural_driver_core::track::{Track, TrackConfig};
use std::time::Instant;

fn create_tracks(count: usize, base: &TrackConfig) -> Vec<Track> {
    (0..count)
        .map(|i| {
            Track::new(TrackConfig {
                seed: base.seed.wrapping_add(i as u64),
                ..base.clone()
            })
        })
        .collect()
}

fn main() {
    let num_agents = 256;
    let ticks = 500;
    println!("Benchmarking fleet of {} agents for {} ticks", num_agents, ticks);

    let track_config = TrackConfig::default();
    let settings = AgentSettings {
        network: NetworkConfig {
            identifier: "bench".into(),
            input_size: track_config.rays,
            hidden_layer_sizes: vec![16, 8],
            ..NetworkConfig::default()
        },
        seed: 42,
        ..AgentSettings::default()
    };
    let training = AgentSettings {
        training: TrainingMode::Continuous,
        ..settings.clone()
    };

    let mut inference = Fleet::seeded(&settings, create_tracks(num_agents, &track_config))
        .unwrap_or_else(|e| panic!("{e}"));
    let mut online = Fleet::seeded(&training, create_tracks(num_agents, &track_config))
        .unwrap_or_else(|e| panic!("{e}"));

    // Inference only
    let start = Instant::now();
    let stats = inference.run(ticks).unwrap_or_else(|e| panic!("{e}"));
    let duration_inference = start.elapsed();
    println!("Time for {} ticks (inference): {:?}", ticks, duration_inference);
    println!("Avg time per tick (inference): {:?}", duration_inference / ticks as u32);
    println!("Episodes completed: {}", stats.episodes);

    // Inference plus one backpropagation step per tick
    let start = Instant::now();
    online.run(ticks).unwrap_or_else(|e| panic!("{e}"));
    let duration_online = start.elapsed();
    println!("Time for {} ticks (continuous training): {:?}", ticks, duration_online);
    println!("Avg time per tick (continuous training): {:?}", duration_online / ticks as u32);

    let diff = duration_online.saturating_sub(duration_inference);
    println!("Total training overhead: {:?}", diff);
    println!("Avg training overhead per tick: {:?}", diff / ticks as u32);

    let crashed = inference
        .agents()
        .iter()
        .filter(|a| a.environment().episode_done())
        .count();
    println!("Agents currently crashed: {}/{}", crashed, num_agents);
}
