//! Particle filter for landmark-based 2-D pose estimation.
//!
//! The filter owns a fixed-size population of weighted pose hypotheses and exposes the
//! classic sequential Monte Carlo cycle: `init` draws the population from a Gaussian
//! prior, `predict` pushes every particle through the unicycle motion model plus process
//! noise, `update_weights` scores each particle against the current landmark
//! observations via the spatial grid, and `resample` draws the next population with
//! replacement, probability proportional to weight.
//!
//! Randomness comes from a single `StdRng` owned by the filter and seeded at
//! construction, so a given seed reproduces a run exactly. The weight update consumes no
//! randomness and its per-particle work is independent, so it runs data-parallel over
//! the population; `init`, `predict`, and `resample` stay sequential to keep the noise
//! stream deterministic.

use crate::grid::{GridPoint, SpatialGrid};
use crate::{MclError, Observation, Result, wrap_angle};

use log::{debug, trace};
use nalgebra::{Rotation2, Vector2};
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::fmt::{self, Debug, Display};

/// Below this yaw rate (rad/s) the arc motion model degenerates; use the straight-line
/// limit instead of dividing by the yaw rate.
const YAW_RATE_EPSILON: f64 = 1e-5;

/// Likelihood substituted for an observation that matched no landmark within the search
/// radius, so a miss penalizes a particle without zeroing its weight.
const LIKELIHOOD_FLOOR: f64 = 1e-10;

/// Denominator of the observation-likelihood exponent. The textbook diagonal Gaussian
/// uses 2; the inflated value keeps the whole population's weights representable when
/// residuals span several cells, instead of collapsing every weight to zero.
const EXPONENT_DAMPING: f64 = 20.0;

/// One weighted pose hypothesis.
///
/// `associations`, `sense_x`, and `sense_y` are scratch diagnostics rebuilt on every
/// weight update: entry *i* holds the matched landmark id and the world-frame
/// coordinates of the *i*-th input observation *that found a match*. Observations with
/// no match are skipped, so these arrays can be shorter than the observation list —
/// downstream consumers index them positionally and rely on that exact behavior.
#[derive(Clone, Debug, Default)]
pub struct Particle {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub weight: f64,
    pub associations: Vec<i32>,
    pub sense_x: Vec<f64>,
    pub sense_y: Vec<f64>,
}

impl Particle {
    pub fn new(id: usize, x: f64, y: f64, theta: f64) -> Particle {
        Particle {
            id,
            x,
            y,
            theta,
            weight: 1.0,
            associations: Vec::new(),
            sense_x: Vec::new(),
            sense_y: Vec::new(),
        }
    }

    /// Matched landmark ids as a single space-separated token stream, no trailing
    /// separator. Diagnostics only.
    pub fn associations_string(&self) -> String {
        join_tokens(self.associations.iter())
    }

    /// World-frame x coordinates of matched observations, space-separated.
    pub fn sense_x_string(&self) -> String {
        join_tokens(self.sense_x.iter())
    }

    /// World-frame y coordinates of matched observations, space-separated.
    pub fn sense_y_string(&self) -> String {
        join_tokens(self.sense_y.iter())
    }
}

fn join_tokens<T: Display>(values: impl Iterator<Item = T>) -> String {
    values
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

impl Display for Particle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Particle {} {{ x: {:.4}, y: {:.4}, theta: {:.4}, weight: {:.4e} }}",
            self.id, self.x, self.y, self.theta, self.weight
        )
    }
}

/// Monte Carlo localization filter over a fixed-size particle population.
///
/// Constructed uninitialized; [`init`](ParticleFilter::init) performs the one-way
/// transition to the initialized state. After `init` the population always holds exactly
/// the configured number of particles — `resample` replaces contents but never the
/// count.
#[derive(Clone)]
pub struct ParticleFilter {
    num_particles: usize,
    particles: Vec<Particle>,
    weights: Vec<f64>,
    pos_std: [f64; 3],
    initialized: bool,
    rng: StdRng,
    searches: u64,
    searched: u64,
}

impl ParticleFilter {
    /// Create an uninitialized filter with a population size of `num_particles`,
    /// seeded from entropy.
    ///
    /// # Errors
    /// [`MclError::InvalidConfiguration`] if `num_particles` is zero.
    pub fn new(num_particles: usize) -> Result<ParticleFilter> {
        Self::new_with_seed(num_particles, rand::random())
    }

    /// Create an uninitialized filter with an explicit random seed.
    ///
    /// The seed drives every random draw the filter makes (prior sampling, process
    /// noise, resampling), so a fixed seed makes a whole run reproducible.
    ///
    /// # Errors
    /// [`MclError::InvalidConfiguration`] if `num_particles` is zero.
    pub fn new_with_seed(num_particles: usize, seed: u64) -> Result<ParticleFilter> {
        if num_particles == 0 {
            return Err(MclError::InvalidConfiguration(
                "particle count must be positive".into(),
            ));
        }
        Ok(ParticleFilter {
            num_particles,
            particles: Vec::new(),
            weights: Vec::new(),
            pos_std: [0.0; 3],
            initialized: false,
            rng: StdRng::seed_from_u64(seed),
            searches: 0,
            searched: 0,
        })
    }

    /// Populate the filter from a Gaussian prior centered on `(x, y, theta)` with the
    /// given per-axis standard deviations, and transition to the initialized state.
    ///
    /// Headings are wrapped to (−π, π] after sampling; every weight starts at 1. The
    /// std-devs are retained and re-sampled as process noise by
    /// [`predict`](ParticleFilter::predict). Zero std-devs are legal and make the prior
    /// (and subsequent process noise) deterministic.
    ///
    /// # Errors
    /// [`MclError::InvalidConfiguration`] if any std-dev is negative or non-finite.
    pub fn init(&mut self, x: f64, y: f64, theta: f64, pos_std: [f64; 3]) -> Result<()> {
        if pos_std.iter().any(|s| !(s.is_finite() && *s >= 0.0)) {
            return Err(MclError::InvalidConfiguration(format!(
                "position std-devs must be finite and non-negative, got {pos_std:?}"
            )));
        }
        self.pos_std = pos_std;
        let noise_x = Normal::new(0.0, pos_std[0]).unwrap();
        let noise_y = Normal::new(0.0, pos_std[1]).unwrap();
        let noise_theta = Normal::new(0.0, pos_std[2]).unwrap();
        let rng = &mut self.rng;
        self.particles = (0..self.num_particles)
            .map(|id| {
                Particle::new(
                    id,
                    x + noise_x.sample(rng),
                    y + noise_y.sample(rng),
                    wrap_angle(theta + noise_theta.sample(rng)),
                )
            })
            .collect();
        self.weights = vec![1.0; self.num_particles];
        self.initialized = true;
        Ok(())
    }

    /// Propagate every particle through the constant-velocity / yaw-rate motion model
    /// over `dt` seconds, then add fresh Gaussian process noise (the `init` std-devs)
    /// and re-wrap the heading.
    ///
    /// When `|yaw_rate|` is below 1e-5 rad/s the straight-line limit
    /// `velocity * cos/sin(theta)` replaces the arc formula to avoid dividing by a
    /// near-zero yaw rate.
    ///
    /// # Errors
    /// [`MclError::NotInitialized`] before `init`;
    /// [`MclError::InvalidConfiguration`] for a non-positive `dt`.
    pub fn predict(&mut self, dt: f64, velocity: f64, yaw_rate: f64) -> Result<()> {
        if !self.initialized {
            return Err(MclError::NotInitialized);
        }
        if !(dt > 0.0) {
            return Err(MclError::InvalidConfiguration(format!(
                "time step must be positive, got {dt}"
            )));
        }
        let noise_x = Normal::new(0.0, self.pos_std[0]).unwrap();
        let noise_y = Normal::new(0.0, self.pos_std[1]).unwrap();
        let noise_theta = Normal::new(0.0, self.pos_std[2]).unwrap();
        let rng = &mut self.rng;
        for particle in self.particles.iter_mut() {
            let heading = particle.theta;
            let new_heading = heading + yaw_rate * dt;
            if yaw_rate.abs() > YAW_RATE_EPSILON {
                let radius = velocity / yaw_rate;
                particle.x += radius * (new_heading.sin() - heading.sin()) + noise_x.sample(rng);
                particle.y += radius * (heading.cos() - new_heading.cos()) + noise_y.sample(rng);
            } else {
                particle.x += velocity * heading.cos() + noise_x.sample(rng);
                particle.y += velocity * heading.sin() + noise_y.sample(rng);
            }
            particle.theta = wrap_angle(new_heading + noise_theta.sample(rng));
        }
        Ok(())
    }

    /// Score every particle against the current observations and rebuild the filter's
    /// weight vector.
    ///
    /// Per particle: each observation is transformed from the vehicle frame to the world
    /// frame by a rigid rotation through the particle's heading plus a translation by
    /// its position, then associated with the nearest landmark in `grid`. A match
    /// contributes a diagonal-covariance Gaussian likelihood of the residual, with the
    /// exponent damped by [`EXPONENT_DAMPING`]; a miss contributes
    /// [`LIKELIHOOD_FLOOR`]. The particle's weight is the product over observations
    /// (1.0 for an empty observation list), and its association/sense scratch arrays are
    /// rebuilt in observation order, silently skipping misses.
    ///
    /// `sensor_range` documents the sensor's advertised reach; the effective gating
    /// radius is the grid's max search distance, which the caller is expected to build
    /// from the same value.
    ///
    /// # Errors
    /// [`MclError::NotInitialized`] before `init`;
    /// [`MclError::InvalidConfiguration`] if a landmark std-dev is not strictly
    /// positive (the likelihood divides by both).
    pub fn update_weights<T: GridPoint + Sync>(
        &mut self,
        sensor_range: f64,
        landmark_std: [f64; 2],
        observations: &[Observation],
        grid: &SpatialGrid<T>,
    ) -> Result<()> {
        if !self.initialized {
            return Err(MclError::NotInitialized);
        }
        if landmark_std.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(MclError::InvalidConfiguration(format!(
                "landmark std-devs must be finite and positive, got {landmark_std:?}"
            )));
        }
        trace!(
            "update_weights: {} observations, sensor range {sensor_range} m",
            observations.len()
        );
        let gauss_norm = 0.5 / (PI * landmark_std[0] * landmark_std[1]);
        let examined: usize = self
            .particles
            .par_iter_mut()
            .map(|particle| {
                particle.associations.clear();
                particle.sense_x.clear();
                particle.sense_y.clear();
                let rotation = Rotation2::new(particle.theta);
                let translation = Vector2::new(particle.x, particle.y);
                let mut weight = 1.0;
                let mut examined = 0;
                for obs in observations {
                    let world = rotation * Vector2::new(obs.x, obs.y) + translation;
                    let (nearest, _dist, count) = grid.find_nearest(world.x, world.y);
                    examined += count;
                    match nearest {
                        Some(landmark) => {
                            let dx = (world.x - landmark.x()) / landmark_std[0];
                            let dy = (world.y - landmark.y()) / landmark_std[1];
                            weight *=
                                gauss_norm * (-(dx * dx + dy * dy) / EXPONENT_DAMPING).exp();
                            particle.associations.push(landmark.id());
                            particle.sense_x.push(world.x);
                            particle.sense_y.push(world.y);
                        }
                        None => weight *= LIKELIHOOD_FLOOR,
                    }
                }
                particle.weight = weight;
                examined
            })
            .sum();
        self.searches += (self.num_particles * observations.len()) as u64;
        self.searched += examined as u64;
        self.weights.clear();
        self.weights.extend(self.particles.iter().map(|p| p.weight));
        Ok(())
    }

    /// Replace the population by drawing `N` particles with replacement, each index
    /// chosen with probability proportional to its current weight (multinomial
    /// resampling). Sampled particles carry their pre-resample weight and scratch
    /// association data.
    ///
    /// Degenerate case: when every weight is zero (or the weight sum is non-finite)
    /// there is no categorical distribution to draw from, so indices are drawn
    /// uniformly instead. That keeps the population size invariant through total weight
    /// collapse, which is a valid runtime outcome rather than an error.
    ///
    /// # Errors
    /// [`MclError::NotInitialized`] before `init`.
    pub fn resample(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(MclError::NotInitialized);
        }
        let total: f64 = self.weights.iter().sum();
        let rng = &mut self.rng;
        let resampled: Vec<Particle> = if total > 0.0 && total.is_finite() {
            let categorical = WeightedIndex::new(&self.weights).unwrap();
            (0..self.num_particles)
                .map(|_| self.particles[categorical.sample(rng)].clone())
                .collect()
        } else {
            debug!("resample: weight sum {total}, falling back to uniform draws");
            (0..self.num_particles)
                .map(|_| self.particles[rng.random_range(0..self.num_particles)].clone())
                .collect()
        };
        self.particles = resampled;
        Ok(())
    }

    /// Overwrite the weight vector (and each particle's weight) directly.
    ///
    /// Test and analysis hook; the normal path is `update_weights`.
    ///
    /// # Errors
    /// [`MclError::NotInitialized`] before `init`;
    /// [`MclError::InvalidConfiguration`] on a length mismatch.
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        if !self.initialized {
            return Err(MclError::NotInitialized);
        }
        if weights.len() != self.num_particles {
            return Err(MclError::InvalidConfiguration(format!(
                "expected {} weights, got {}",
                self.num_particles,
                weights.len()
            )));
        }
        self.weights.clear();
        self.weights.extend_from_slice(weights);
        for (particle, &w) in self.particles.iter_mut().zip(weights) {
            particle.weight = w;
        }
        Ok(())
    }

    /// The particle with the highest weight, or `None` before `init`.
    pub fn best_particle(&self) -> Option<&Particle> {
        self.particles
            .iter()
            .max_by(|a, b| a.weight.total_cmp(&b.weight))
    }

    /// Effective sample size `1 / Σ wᵢ²` of the current weight vector; 0 when every
    /// weight is zero.
    pub fn effective_sample_size(&self) -> f64 {
        let sum_of_squares: f64 = self.weights.iter().map(|w| w * w).sum();
        if sum_of_squares > 0.0 {
            1.0 / sum_of_squares
        } else {
            0.0
        }
    }

    /// Mean number of stored points examined per nearest-landmark query so far.
    pub fn average_search(&self) -> f64 {
        if self.searches > 0 {
            self.searched as f64 / self.searches as f64
        } else {
            0.0
        }
    }

    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl Debug for ParticleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let min_weight = self.weights.iter().copied().fold(f64::INFINITY, f64::min);
        let max_weight = self.weights.iter().copied().fold(0.0, f64::max);
        f.debug_struct("ParticleFilter")
            .field("num_particles", &self.num_particles)
            .field("initialized", &self.initialized)
            .field("effective_sample_size", &self.effective_sample_size())
            .field(
                "weight_range",
                &format_args!("[{:.4e}, {:.4e}]", min_weight, max_weight),
            )
            .field("average_search", &self.average_search())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Bounds;
    use crate::map::Landmark;
    use assert_approx_eq::assert_approx_eq;

    fn single_landmark_grid() -> SpatialGrid<Landmark> {
        let mut grid =
            SpatialGrid::new(Bounds::new(-10.0, -10.0, 10.0, 10.0), 2.0, 10.0).unwrap();
        grid.insert(Landmark::new(42, 1.0, 1.0)).unwrap();
        grid
    }

    #[test]
    fn rejects_zero_particles() {
        assert!(matches!(
            ParticleFilter::new_with_seed(0, 1),
            Err(MclError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn operations_fail_before_init() {
        let grid = single_landmark_grid();
        let mut pf = ParticleFilter::new_with_seed(10, 1).unwrap();
        assert!(matches!(pf.predict(0.1, 1.0, 0.0), Err(MclError::NotInitialized)));
        assert!(matches!(
            pf.update_weights(50.0, [0.3, 0.3], &[], &grid),
            Err(MclError::NotInitialized)
        ));
        assert!(matches!(pf.resample(), Err(MclError::NotInitialized)));
        assert!(matches!(pf.set_weights(&[1.0; 10]), Err(MclError::NotInitialized)));
        assert!(pf.best_particle().is_none());
    }

    #[test]
    fn init_rejects_negative_std() {
        let mut pf = ParticleFilter::new_with_seed(10, 1).unwrap();
        assert!(matches!(
            pf.init(0.0, 0.0, 0.0, [0.3, -0.1, 0.01]),
            Err(MclError::InvalidConfiguration(_))
        ));
        assert!(!pf.initialized());
    }

    #[test]
    fn init_with_zero_noise_is_deterministic() {
        let mut pf = ParticleFilter::new_with_seed(50, 99).unwrap();
        pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
        assert!(pf.initialized());
        assert_eq!(pf.particles().len(), 50);
        for particle in pf.particles() {
            assert_eq!(particle.x, 0.0);
            assert_eq!(particle.y, 0.0);
            assert_eq!(particle.theta, 0.0);
            assert_eq!(particle.weight, 1.0);
        }
    }

    #[test]
    fn init_wraps_heading() {
        let mut pf = ParticleFilter::new_with_seed(200, 7).unwrap();
        // Center heading past 2π with noise wide enough to push further.
        pf.init(3.0, -2.0, 3.0 * PI, [0.3, 0.3, 2.0]).unwrap();
        for particle in pf.particles() {
            assert!(particle.theta > -PI && particle.theta <= PI);
        }
    }

    #[test]
    fn predict_straight_line_exact() {
        let mut pf = ParticleFilter::new_with_seed(5, 3).unwrap();
        let theta = 0.7;
        pf.init(2.0, -1.0, theta, [0.0, 0.0, 0.0]).unwrap();
        pf.predict(0.1, 4.0, 0.0).unwrap();
        for particle in pf.particles() {
            // Straight-line limit: displacement velocity * cos/sin(theta).
            assert_approx_eq!(particle.x, 2.0 + 4.0 * theta.cos(), 1e-12);
            assert_approx_eq!(particle.y, -1.0 + 4.0 * theta.sin(), 1e-12);
            assert_approx_eq!(particle.theta, theta, 1e-12);
        }
    }

    #[test]
    fn predict_arc_matches_closed_form() {
        let mut pf = ParticleFilter::new_with_seed(5, 3).unwrap();
        let (x0, y0, theta0) = (1.0, 2.0, 0.3);
        let (dt, v, yaw_rate) = (0.5, 6.0, 0.8);
        pf.init(x0, y0, theta0, [0.0, 0.0, 0.0]).unwrap();
        pf.predict(dt, v, yaw_rate).unwrap();
        let theta1 = theta0 + yaw_rate * dt;
        for particle in pf.particles() {
            assert_approx_eq!(particle.x, x0 + v / yaw_rate * (theta1.sin() - theta0.sin()), 1e-12);
            assert_approx_eq!(particle.y, y0 + v / yaw_rate * (theta0.cos() - theta1.cos()), 1e-12);
            assert_approx_eq!(particle.theta, theta1, 1e-12);
        }
    }

    #[test]
    fn predict_wraps_heading_past_two_pi() {
        let mut pf = ParticleFilter::new_with_seed(5, 3).unwrap();
        pf.init(0.0, 0.0, 3.0, [0.0, 0.0, 0.0]).unwrap();
        // 3.0 + 4.0 > 2π, must come back wrapped.
        pf.predict(1.0, 0.0, 4.0).unwrap();
        for particle in pf.particles() {
            assert!(particle.theta > -PI && particle.theta <= PI);
            assert_approx_eq!(particle.theta, wrap_angle(7.0), 1e-12);
        }
    }

    #[test]
    fn predict_rejects_bad_dt() {
        let mut pf = ParticleFilter::new_with_seed(5, 3).unwrap();
        pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            pf.predict(0.0, 1.0, 0.0),
            Err(MclError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn update_with_no_observations_gives_unit_weight() {
        let grid = single_landmark_grid();
        let mut pf = ParticleFilter::new_with_seed(8, 11).unwrap();
        pf.init(0.0, 0.0, 0.0, [0.1, 0.1, 0.01]).unwrap();
        pf.update_weights(50.0, [0.3, 0.3], &[], &grid).unwrap();
        assert_eq!(pf.weights().len(), 8);
        for &w in pf.weights() {
            assert_eq!(w, 1.0);
        }
    }

    #[test]
    fn update_all_misses_hits_likelihood_floor() {
        // World large enough that observations far from the single landmark exceed the
        // grid's search radius for every particle.
        let mut grid =
            SpatialGrid::new(Bounds::new(-100.0, -100.0, 100.0, 100.0), 2.0, 6.0).unwrap();
        grid.insert(Landmark::new(1, 90.0, 90.0)).unwrap();
        let mut pf = ParticleFilter::new_with_seed(4, 5).unwrap();
        pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
        let observations = [Observation::new(1.0, 0.0), Observation::new(0.0, 1.0), Observation::new(-1.0, 0.0)];
        pf.update_weights(50.0, [0.3, 0.3], &observations, &grid).unwrap();
        for (particle, &w) in pf.particles().iter().zip(pf.weights()) {
            assert_eq!(w, LIKELIHOOD_FLOOR * LIKELIHOOD_FLOOR * LIKELIHOOD_FLOOR);
            assert!(particle.associations.is_empty());
            assert!(particle.sense_x.is_empty());
            assert!(particle.sense_y.is_empty());
        }
    }

    #[test]
    fn update_scores_matched_observation() {
        let grid = single_landmark_grid();
        let mut pf = ParticleFilter::new_with_seed(1, 5).unwrap();
        pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
        // Observation at vehicle-frame (1.2, 0.9) with heading 0 lands on world
        // (1.2, 0.9); residual to the landmark at (1, 1) is (0.2, -0.1).
        let observations = [Observation::new(1.2, 0.9)];
        pf.update_weights(50.0, [0.3, 0.3], &observations, &grid).unwrap();
        let sx = 0.3;
        let sy = 0.3;
        let expected = 0.5 / (PI * sx * sy)
            * (-((0.2 / sx) * (0.2 / sx) + (0.1 / sy) * (0.1 / sy)) / 20.0).exp();
        assert_approx_eq!(pf.weights()[0], expected, 1e-12);
        let particle = &pf.particles()[0];
        assert_eq!(particle.associations, vec![42]);
        assert_approx_eq!(particle.sense_x[0], 1.2, 1e-12);
        assert_approx_eq!(particle.sense_y[0], 0.9, 1e-12);
    }

    #[test]
    fn update_transforms_through_heading() {
        let grid = single_landmark_grid();
        let mut pf = ParticleFilter::new_with_seed(1, 5).unwrap();
        // Heading π/2 turns vehicle-frame (1, 0) into world-frame (0, 1) before the
        // translation by the particle position (1, 0) → world (1, 1), dead on the
        // landmark.
        pf.init(1.0, 0.0, PI / 2.0, [0.0, 0.0, 0.0]).unwrap();
        let observations = [Observation::new(1.0, 0.0)];
        pf.update_weights(50.0, [0.3, 0.3], &observations, &grid).unwrap();
        let particle = &pf.particles()[0];
        assert_eq!(particle.associations, vec![42]);
        assert_approx_eq!(particle.sense_x[0], 1.0, 1e-9);
        assert_approx_eq!(particle.sense_y[0], 1.0, 1e-9);
        assert_approx_eq!(pf.weights()[0], 0.5 / (PI * 0.09), 1e-9);
    }

    #[test]
    fn update_skips_misses_in_association_order() {
        // One observation matches, the next falls outside the search radius: the
        // association/sense arrays keep only the match, ending up shorter than the
        // observation list. Positional consumers depend on exactly this.
        let mut grid =
            SpatialGrid::new(Bounds::new(-100.0, -100.0, 100.0, 100.0), 2.0, 6.0).unwrap();
        grid.insert(Landmark::new(9, 1.0, 1.0)).unwrap();
        let mut pf = ParticleFilter::new_with_seed(1, 5).unwrap();
        pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
        let observations = [Observation::new(1.0, 1.0), Observation::new(80.0, -80.0)];
        pf.update_weights(50.0, [0.3, 0.3], &observations, &grid).unwrap();
        let particle = &pf.particles()[0];
        assert_eq!(particle.associations, vec![9]);
        assert_eq!(particle.sense_x.len(), 1);
        assert_eq!(particle.sense_y.len(), 1);
    }

    #[test]
    fn update_rejects_non_positive_landmark_std() {
        let grid = single_landmark_grid();
        let mut pf = ParticleFilter::new_with_seed(2, 5).unwrap();
        pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            pf.update_weights(50.0, [0.0, 0.3], &[], &grid),
            Err(MclError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn resample_preserves_population_size() {
        let grid = single_landmark_grid();
        let mut pf = ParticleFilter::new_with_seed(64, 17).unwrap();
        pf.init(0.5, 0.5, 0.1, [0.2, 0.2, 0.05]).unwrap();
        assert_eq!(pf.particles().len(), 64);
        pf.predict(0.1, 2.0, 0.3).unwrap();
        assert_eq!(pf.particles().len(), 64);
        pf.update_weights(50.0, [0.3, 0.3], &[Observation::new(0.5, 0.5)], &grid)
            .unwrap();
        pf.resample().unwrap();
        assert_eq!(pf.particles().len(), 64);
    }

    #[test]
    fn resample_with_single_massive_weight_clones_that_particle() {
        let mut pf = ParticleFilter::new_with_seed(4, 23).unwrap();
        pf.init(0.0, 0.0, 0.0, [1.0, 1.0, 0.5]).unwrap();
        pf.set_weights(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        let chosen = pf.particles()[0].clone();
        pf.resample().unwrap();
        for particle in pf.particles() {
            assert_eq!(particle.id, 0);
            assert_eq!(particle.x, chosen.x);
            assert_eq!(particle.y, chosen.y);
            assert_eq!(particle.theta, chosen.theta);
        }
    }

    #[test]
    fn resample_with_all_zero_weights_draws_uniformly() {
        let mut pf = ParticleFilter::new_with_seed(256, 31).unwrap();
        pf.init(0.0, 0.0, 0.0, [1.0, 1.0, 0.5]).unwrap();
        pf.set_weights(&vec![0.0; 256]).unwrap();
        pf.resample().unwrap();
        assert_eq!(pf.particles().len(), 256);
        // Uniform fallback keeps drawing from the whole population instead of pinning
        // one index.
        let distinct: std::collections::HashSet<usize> =
            pf.particles().iter().map(|p| p.id).collect();
        assert!(distinct.len() > 100, "only {} distinct sources", distinct.len());
    }

    #[test]
    fn debug_strings_are_space_separated_without_trailing_space() {
        let mut particle = Particle::new(0, 0.0, 0.0, 0.0);
        particle.associations = vec![3, 1, 4];
        particle.sense_x = vec![1.5, 2.5];
        particle.sense_y = vec![-0.5, 0.25];
        assert_eq!(particle.associations_string(), "3 1 4");
        assert_eq!(particle.sense_x_string(), "1.5 2.5");
        assert_eq!(particle.sense_y_string(), "-0.5 0.25");
        let empty = Particle::new(1, 0.0, 0.0, 0.0);
        assert_eq!(empty.associations_string(), "");
    }

    #[test]
    fn average_search_counts_examined_points() {
        let grid = single_landmark_grid();
        let mut pf = ParticleFilter::new_with_seed(4, 5).unwrap();
        pf.init(0.0, 0.0, 0.0, [0.0, 0.0, 0.0]).unwrap();
        assert_eq!(pf.average_search(), 0.0);
        pf.update_weights(50.0, [0.3, 0.3], &[Observation::new(1.0, 1.0)], &grid)
            .unwrap();
        assert!(pf.average_search() >= 1.0);
    }
}
