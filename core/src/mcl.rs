//! Landmark-based Monte Carlo localization toolbox
//!
//! This crate estimates the continuous 2-D pose (x, y, heading) of a moving vehicle from
//! noisy relative landmark observations and a known landmark map, using a particle filter
//! (sequential Monte Carlo localization). The filter maintains a fixed-size population of
//! weighted pose hypotheses and cycles through three operations per telemetry step:
//!
//! 1. **Predict** — propagate every particle through a constant-velocity / yaw-rate
//!    (unicycle) motion model and add Gaussian process noise.
//! 2. **Update** — transform each vehicle-frame observation into the world frame per
//!    particle, associate it with the nearest mapped landmark, and accumulate a
//!    per-particle likelihood weight.
//! 3. **Resample** — draw a fresh population with replacement, probability proportional
//!    to weight, concentrating hypotheses on high-likelihood poses.
//!
//! Landmark association is the hot path: it runs once per observation per particle per
//! step. To keep that tractable the map is bucketed into a uniform grid
//! ([`grid::SpatialGrid`]) that answers nearest-landmark queries with an expanding-ring
//! search instead of a linear scan over the whole map. The search is deliberately
//! approximate (it stops at the first ring level that yields any landmark); see the
//! module docs in [`grid`] for the exact guarantee.
//!
//! Primarily built off of two crate dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): the rigid-body transform from the
//!   vehicle frame to the world frame.
//! - [`rand`](https://crates.io/crates/rand) / [`rand_distr`](https://crates.io/crates/rand_distr):
//!   Gaussian process noise and categorical resampling, driven by a seedable generator
//!   owned by the filter so that runs are reproducible.
//!
//! The filter core is transport-agnostic: telemetry arrival and response delivery live in
//! the [`messages`] and [`sim`] modules (wire structs and an offline replay driver), and
//! the map comes from [`map`]. Nothing in the core blocks on I/O.

pub mod filter;
pub mod grid;
pub mod map;
pub mod messages;
pub mod sim;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::f64::consts::{PI, TAU};

/// Errors surfaced by the localization core and its collaborator layers.
///
/// The first three variants are the core's precondition taxonomy: all are detected
/// eagerly and none are retried internally. Runtime numerical degeneracies (all particle
/// weights zero, no landmark found for an observation) are *not* errors; they are valid
/// algorithmic outcomes handled inside the filter.
#[derive(thiserror::Error, Debug)]
pub enum MclError {
    /// Bad bounding rectangle or cell size at index construction, or an inserted point
    /// outside the configured world.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A filter operation was invoked before `init`.
    #[error("particle filter used before init")]
    NotInitialized,

    /// Non-positive particle count, negative noise std-dev, or similar bad parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed telemetry frame content.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Unreadable or malformed landmark map.
    #[error("map error: {0}")]
    Map(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for MclError {
    fn from(e: csv::Error) -> Self {
        MclError::Map(e.to_string())
    }
}

impl From<std::num::ParseFloatError> for MclError {
    fn from(e: std::num::ParseFloatError) -> Self {
        MclError::Telemetry(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MclError>;

/// A single landmark detection in the vehicle's local frame.
///
/// Coordinates are meters, x forward and y left of the sensor. Observations carry no
/// identity; association with a mapped landmark happens per particle during the weight
/// update. Relative ordering within a telemetry frame is significant (it is echoed into
/// the particles' sense arrays) but frames are memoryless.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub x: f64,
    pub y: f64,
}

impl Observation {
    pub fn new(x: f64, y: f64) -> Observation {
        Observation { x, y }
    }
}

impl Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Observation {{ x: {:.4}, y: {:.4} }}", self.x, self.y)
    }
}

/// Wrap an angle in radians to the canonical range (−π, π].
///
/// Used for particle headings after sampling the Gaussian prior and after adding yaw
/// process noise, so every heading the filter reports is canonical no matter how far the
/// raw value drifted past ±2π.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI { PI } else { wrapped }
}
