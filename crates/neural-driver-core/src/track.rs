//! Minimal reference environment: a kinematic car among circular obstacles,
//! sensing with a fan of rays.
//!
//! Observation: one reading per ray, `(ray_length - hit_distance) / ray_length`,
//! or 0 when nothing is within range. Arena walls count as hits.
//! Action: index 0 steers, index 1 throttles, both clamped to `[-1, 1]`.

use crate::agent::{Environment, PlayerInput};
use rand::Rng;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

const DT: f64 = 0.05;
const MAX_SPEED: f64 = 10.0;
const ACCELERATION: f64 = 5.0;
/// Heading change per second at full steering.
const TURN_RATE: f64 = 2.0;
const CAR_RADIUS: f64 = 0.8;
/// Angle between the outermost rays, centered on the heading.
const RAY_SPREAD_DEGREES: f64 = 120.0;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackConfig {
    pub width: f64,
    pub height: f64,
    pub obstacle_count: usize,
    pub obstacle_radius_min: f64,
    pub obstacle_radius_max: f64,
    /// No obstacle is placed closer than this to the start position.
    pub start_clearance: f64,
    /// Also the observation width.
    pub rays: usize,
    pub ray_length: f64,
    pub seed: u64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 100.0,
            obstacle_count: 40,
            obstacle_radius_min: 1.0,
            obstacle_radius_max: 4.0,
            start_clearance: 8.0,
            rays: 5,
            ray_length: 15.0,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackConfigError {
    NonPositive(&'static str),
    InvalidRadiusRange { min: f64, max: f64 },
    NoRays,
    ArenaTooSmall,
}

impl fmt::Display for TrackConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackConfigError::NonPositive(field) => {
                write!(f, "{field} must be finite and positive")
            }
            TrackConfigError::InvalidRadiusRange { min, max } => write!(
                f,
                "obstacle radius range is invalid: min {min} must not exceed max {max}"
            ),
            TrackConfigError::NoRays => write!(f, "rays must be positive"),
            TrackConfigError::ArenaTooSmall => {
                write!(f, "arena must fit the car and its start clearance")
            }
        }
    }
}

impl Error for TrackConfigError {}

impl TrackConfig {
    pub fn validate(&self) -> Result<(), TrackConfigError> {
        let positive = [
            ("width", self.width),
            ("height", self.height),
            ("obstacle_radius_min", self.obstacle_radius_min),
            ("ray_length", self.ray_length),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(TrackConfigError::NonPositive(field));
            }
        }
        if !(self.obstacle_radius_max.is_finite()
            && self.obstacle_radius_min <= self.obstacle_radius_max)
        {
            return Err(TrackConfigError::InvalidRadiusRange {
                min: self.obstacle_radius_min,
                max: self.obstacle_radius_max,
            });
        }
        if self.rays == 0 {
            return Err(TrackConfigError::NoRays);
        }
        let half_min = self.width.min(self.height) / 2.0;
        if !(self.start_clearance.is_finite() && self.start_clearance >= 0.0)
            || CAR_RADIUS.max(self.start_clearance + self.obstacle_radius_max) >= half_min
        {
            return Err(TrackConfigError::ArenaTooSmall);
        }
        Ok(())
    }

    /// Ray angles relative to the heading, spread evenly from right to left.
    pub fn ray_angles(&self) -> Vec<f64> {
        if self.rays == 1 {
            return vec![0.0];
        }
        let spread = RAY_SPREAD_DEGREES.to_radians();
        let step = spread / (self.rays - 1) as f64;
        (0..self.rays).map(|i| -spread / 2.0 + step * i as f64).collect()
    }
}

/// Circular obstacle on the track.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obstacle {
    pub center: [f64; 2],
    pub radius: f64,
}

impl RTreeObject for Obstacle {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        square_around(self.center, self.radius)
    }
}

fn square_around(center: [f64; 2], half: f64) -> AABB<[f64; 2]> {
    AABB::from_corners(
        [center[0] - half, center[1] - half],
        [center[0] + half, center[1] + half],
    )
}

/// Distance along a unit ray to where it enters `obstacle`; 0 from inside.
fn ray_circle(origin: [f64; 2], dir: [f64; 2], obstacle: &Obstacle) -> Option<f64> {
    let m = [origin[0] - obstacle.center[0], origin[1] - obstacle.center[1]];
    let b = m[0] * dir[0] + m[1] * dir[1];
    let c = m[0] * m[0] + m[1] * m[1] - obstacle.radius * obstacle.radius;
    if c > 0.0 && b > 0.0 {
        return None;
    }
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    Some((-b - disc.sqrt()).max(0.0))
}

/// Pose and motion of the car.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CarState {
    pub position: [f64; 2],
    pub heading: f64,
    pub speed: f64,
}

pub struct Track {
    config: TrackConfig,
    obstacles: RTree<Obstacle>,
    ray_angles: Vec<f64>,
    car: CarState,
    crashed: bool,
    crashes: usize,
    distance: f64,
}

impl Track {
    pub fn new(config: TrackConfig) -> Self {
        Self::try_new(config).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Scatter `obstacle_count` obstacles from `config.seed`, keeping the
    /// start area clear.
    pub fn try_new(config: TrackConfig) -> Result<Self, TrackConfigError> {
        config.validate()?;
        let mut rng = crate::rng::create_rng(config.seed);
        let start = Self::start_state(&config);
        let obstacles = (0..config.obstacle_count)
            .map(|_| loop {
                let radius =
                    rng.random_range(config.obstacle_radius_min..=config.obstacle_radius_max);
                let center = [
                    rng.random_range(0.0..config.width),
                    rng.random_range(0.0..config.height),
                ];
                let dx = center[0] - start.position[0];
                let dy = center[1] - start.position[1];
                let keep_out = config.start_clearance + radius;
                if dx * dx + dy * dy > keep_out * keep_out {
                    break Obstacle { center, radius };
                }
            })
            .collect();
        Self::with_obstacles(config, obstacles)
    }

    pub fn with_obstacles(
        config: TrackConfig,
        obstacles: Vec<Obstacle>,
    ) -> Result<Self, TrackConfigError> {
        config.validate()?;
        Ok(Self {
            obstacles: RTree::bulk_load(obstacles),
            ray_angles: config.ray_angles(),
            car: Self::start_state(&config),
            crashed: false,
            crashes: 0,
            distance: 0.0,
            config,
        })
    }

    fn start_state(config: &TrackConfig) -> CarState {
        CarState {
            position: [config.width / 2.0, config.height / 2.0],
            heading: 0.0,
            speed: 0.0,
        }
    }

    pub fn car(&self) -> &CarState {
        &self.car
    }

    pub fn crashed(&self) -> bool {
        self.crashed
    }

    /// Crashes over the whole life of the track, across resets.
    pub fn crashes(&self) -> usize {
        self.crashes
    }

    /// Distance driven in the current episode.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn obstacle_count(&self) -> usize {
        self.obstacles.size()
    }

    /// Normalized reading of one ray at `angle` relative to the heading.
    pub fn sense(&self, angle: f64) -> f32 {
        let theta = self.car.heading + angle;
        let dir = [theta.cos(), theta.sin()];
        let len = self.config.ray_length;
        let obstacle = self.cast_ray(dir);
        let hit = match (obstacle, self.wall_distance(dir)) {
            (Some(o), Some(w)) => Some(o.min(w)),
            (o, w) => o.or(w),
        };
        match hit {
            Some(dist) => ((len - dist) / len) as f32,
            None => 0.0,
        }
    }

    /// Envelope query over the ray's bounding box, then an exact test.
    fn cast_ray(&self, dir: [f64; 2]) -> Option<f64> {
        let origin = self.car.position;
        let len = self.config.ray_length;
        let end = [origin[0] + dir[0] * len, origin[1] + dir[1] * len];
        let envelope = AABB::from_corners(
            [origin[0].min(end[0]), origin[1].min(end[1])],
            [origin[0].max(end[0]), origin[1].max(end[1])],
        );
        self.obstacles
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|o| ray_circle(origin, dir, o))
            .filter(|&t| t <= len)
            .min_by(f64::total_cmp)
    }

    fn wall_distance(&self, dir: [f64; 2]) -> Option<f64> {
        let bounds = [self.config.width, self.config.height];
        let t = (0..2)
            .filter_map(|axis| {
                let p = self.car.position[axis];
                let d = dir[axis];
                if d > 0.0 {
                    Some((bounds[axis] - p) / d)
                } else if d < 0.0 {
                    Some(-p / d)
                } else {
                    None
                }
            })
            .fold(f64::INFINITY, f64::min)
            .max(0.0);
        (t <= self.config.ray_length).then_some(t)
    }

    fn collides(&self) -> bool {
        let [x, y] = self.car.position;
        if x < CAR_RADIUS
            || y < CAR_RADIUS
            || x > self.config.width - CAR_RADIUS
            || y > self.config.height - CAR_RADIUS
        {
            return true;
        }
        self.obstacles
            .locate_in_envelope_intersecting(&square_around(self.car.position, CAR_RADIUS))
            .any(|o| {
                let dx = o.center[0] - x;
                let dy = o.center[1] - y;
                let reach = o.radius + CAR_RADIUS;
                dx * dx + dy * dy <= reach * reach
            })
    }
}

impl Environment for Track {
    fn observe(&mut self, input: &mut [f32]) {
        for (slot, &angle) in input.iter_mut().zip(&self.ray_angles) {
            *slot = self.sense(angle);
        }
    }

    fn observation_len(&self) -> Option<usize> {
        Some(self.config.rays)
    }

    /// A crashed car stays put until reset.
    fn actuate(&mut self, output: &[f32]) {
        if self.crashed {
            return;
        }
        let steering = output.first().copied().unwrap_or(0.0).clamp(-1.0, 1.0) as f64;
        let throttle = output.get(1).copied().unwrap_or(0.0).clamp(-1.0, 1.0) as f64;

        self.car.heading += steering * TURN_RATE * DT;
        self.car.speed = (self.car.speed + throttle * ACCELERATION * DT).clamp(0.0, MAX_SPEED);
        let step = self.car.speed * DT;
        self.car.position[0] += self.car.heading.cos() * step;
        self.car.position[1] += self.car.heading.sin() * step;
        self.distance += step;

        if self.collides() {
            self.crashed = true;
            self.crashes += 1;
            log::debug!(
                "car crashed at ({:.2}, {:.2}) after {:.2} units",
                self.car.position[0],
                self.car.position[1],
                self.distance
            );
        }
    }

    fn on_reset(&mut self) {
        self.car = Self::start_state(&self.config);
        self.crashed = false;
        self.distance = 0.0;
    }

    fn episode_done(&self) -> bool {
        self.crashed
    }
}

/// Scripted stand-in for a human driver: full throttle with a slow sinusoidal
/// weave.
#[derive(Clone, Debug)]
pub struct WeavingDriver {
    phase: f32,
    step: f32,
    throttle: f32,
}

impl WeavingDriver {
    pub fn new(step: f32, throttle: f32) -> Self {
        Self {
            phase: 0.0,
            step,
            throttle,
        }
    }
}

impl Default for WeavingDriver {
    fn default() -> Self {
        Self::new(0.05, 1.0)
    }
}

impl PlayerInput for WeavingDriver {
    fn fill(&mut self, output: &mut [f32]) {
        output.fill(0.0);
        if let Some(steer) = output.first_mut() {
            *steer = self.phase.sin();
        }
        if let Some(throttle) = output.get_mut(1) {
            *throttle = self.throttle;
        }
        self.phase += self.step;
    }
}
