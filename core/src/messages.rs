//! Telemetry wire contract and filter configuration.
//!
//! The telemetry link delivers one frame per cycle: either an initial pose estimate
//! (first cycle) or the previous cycle's control inputs, plus the current landmark
//! observations. The link encodes every numeric field as a decimal string and the
//! observation lists as space-separated coordinate streams; [`TelemetryFrame`] mirrors
//! that encoding exactly, and [`TelemetryFrame::parse`] lifts it into typed values.
//!
//! The response contract is [`BestParticleMessage`]: the highest-weight particle's pose
//! plus its association and sense token streams, under the field names the link expects.

use crate::filter::Particle;
use crate::{MclError, Observation, Result};

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

/// One raw telemetry frame as it arrives off the wire.
///
/// The pose fields are present on the first frame of a session; the control fields on
/// every later frame. Observation lists are always present (possibly empty strings).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TelemetryFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sense_x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sense_y: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sense_theta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_velocity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_yawrate: Option<String>,
    #[serde(default)]
    pub sense_observations_x: String,
    #[serde(default)]
    pub sense_observations_y: String,
}

/// A noisy absolute pose estimate (the "GPS" fix used to seed the filter).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseEstimate {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

/// Control inputs over the previous cycle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlInput {
    pub velocity: f64,
    pub yaw_rate: f64,
}

/// A telemetry frame lifted into typed values.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryInput {
    pub pose: Option<PoseEstimate>,
    pub control: Option<ControlInput>,
    pub observations: Vec<Observation>,
}

impl TelemetryFrame {
    /// Parse the string-encoded fields into a [`TelemetryInput`].
    ///
    /// # Errors
    /// [`MclError::Telemetry`] on an unparsable number, a pose or control group with
    /// only some of its fields present, or observation coordinate lists of different
    /// lengths.
    pub fn parse(&self) -> Result<TelemetryInput> {
        let pose = match (&self.sense_x, &self.sense_y, &self.sense_theta) {
            (Some(x), Some(y), Some(theta)) => Some(PoseEstimate {
                x: x.trim().parse()?,
                y: y.trim().parse()?,
                theta: theta.trim().parse()?,
            }),
            (None, None, None) => None,
            _ => {
                return Err(MclError::Telemetry(
                    "partial initial pose: sense_x/sense_y/sense_theta must appear together".into(),
                ));
            }
        };
        let control = match (&self.previous_velocity, &self.previous_yawrate) {
            (Some(velocity), Some(yaw_rate)) => Some(ControlInput {
                velocity: velocity.trim().parse()?,
                yaw_rate: yaw_rate.trim().parse()?,
            }),
            (None, None) => None,
            _ => {
                return Err(MclError::Telemetry(
                    "partial control input: previous_velocity/previous_yawrate must appear together"
                        .into(),
                ));
            }
        };
        let xs = parse_coordinate_list(&self.sense_observations_x)?;
        let ys = parse_coordinate_list(&self.sense_observations_y)?;
        if xs.len() != ys.len() {
            return Err(MclError::Telemetry(format!(
                "observation list length mismatch: {} x values, {} y values",
                xs.len(),
                ys.len()
            )));
        }
        let observations = xs
            .into_iter()
            .zip(ys)
            .map(|(x, y)| Observation::new(x, y))
            .collect();
        Ok(TelemetryInput {
            pose,
            control,
            observations,
        })
    }
}

/// Parse a space-separated stream of decimal tokens.
fn parse_coordinate_list(list: &str) -> Result<Vec<f64>> {
    list.split_whitespace()
        .map(|token| token.parse::<f64>().map_err(MclError::from))
        .collect()
}

/// The per-cycle response: the best pose hypothesis and its association diagnostics,
/// under the wire field names the telemetry link expects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestParticleMessage {
    pub best_particle_x: f64,
    pub best_particle_y: f64,
    pub best_particle_theta: f64,
    pub best_particle_associations: String,
    pub best_particle_sense_x: String,
    pub best_particle_sense_y: String,
}

impl BestParticleMessage {
    pub fn from_particle(particle: &Particle) -> BestParticleMessage {
        BestParticleMessage {
            best_particle_x: particle.x,
            best_particle_y: particle.y,
            best_particle_theta: particle.theta,
            best_particle_associations: particle.associations_string(),
            best_particle_sense_x: particle.sense_x_string(),
            best_particle_sense_y: particle.sense_y_string(),
        }
    }
}

fn default_num_particles() -> usize {
    1000
}
fn default_sigma_pos() -> [f64; 3] {
    [0.3, 0.3, 0.01]
}
fn default_sigma_landmark() -> [f64; 2] {
    [0.3, 0.3]
}
fn default_sensor_range() -> f64 {
    50.0
}
fn default_dt() -> f64 {
    0.1
}
fn default_cell_size() -> f64 {
    5.0
}
fn default_world_margin() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    42
}

/// Full filter configuration: population size, noise models, sensor geometry, grid
/// resolution, and the random seed.
///
/// Every field has a default matching the stock telemetry-simulator setup, so a config
/// file only needs to name what it overrides. Use the same seed to repeat a run exactly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of particles in the population.
    #[serde(default = "default_num_particles")]
    pub num_particles: usize,

    /// Pose-prior / process-noise standard deviations [x (m), y (m), theta (rad)].
    #[serde(default = "default_sigma_pos")]
    pub sigma_pos: [f64; 3],

    /// Landmark measurement noise standard deviations [x (m), y (m)].
    #[serde(default = "default_sigma_landmark")]
    pub sigma_landmark: [f64; 2],

    /// Sensor range (m); also the grid's maximum search distance.
    #[serde(default = "default_sensor_range")]
    pub sensor_range: f64,

    /// Time between telemetry frames (s).
    #[serde(default = "default_dt")]
    pub dt: f64,

    /// Side length of a grid cell (m).
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,

    /// Margin added around the landmark bounding rectangle when sizing the world (m).
    #[serde(default = "default_world_margin")]
    pub world_margin: f64,

    /// Random seed for the filter's generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: default_num_particles(),
            sigma_pos: default_sigma_pos(),
            sigma_landmark: default_sigma_landmark(),
            sensor_range: default_sensor_range(),
            dt: default_dt(),
            cell_size: default_cell_size(),
            world_margin: default_world_margin(),
            seed: default_seed(),
        }
    }
}

impl FilterConfig {
    /// Check every parameter the error taxonomy covers.
    ///
    /// # Errors
    /// [`MclError::InvalidConfiguration`] on a zero particle count or any non-positive
    /// std-dev, sensor range, time step, or cell size. The world margin may be zero.
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(MclError::InvalidConfiguration(
                "particle count must be positive".into(),
            ));
        }
        if self.sigma_pos.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(MclError::InvalidConfiguration(format!(
                "pose std-devs must be positive, got {:?}",
                self.sigma_pos
            )));
        }
        if self.sigma_landmark.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(MclError::InvalidConfiguration(format!(
                "landmark std-devs must be positive, got {:?}",
                self.sigma_landmark
            )));
        }
        for (name, value) in [
            ("sensor_range", self.sensor_range),
            ("dt", self.dt),
            ("cell_size", self.cell_size),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(MclError::InvalidConfiguration(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(self.world_margin.is_finite() && self.world_margin >= 0.0) {
            return Err(MclError::InvalidConfiguration(format!(
                "world_margin must be non-negative, got {}",
                self.world_margin
            )));
        }
        Ok(())
    }

    /// Write the configuration to a JSON file (pretty-printed).
    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self).map_err(io::Error::other)
    }

    /// Read the configuration from a JSON file.
    pub fn from_json<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(file).map_err(io::Error::other)
    }

    /// Write the configuration as YAML.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = serde_yaml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }

    /// Read the configuration from YAML.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_yaml::from_reader(file).map_err(io::Error::other)
    }

    /// Write the configuration as TOML.
    pub fn to_toml<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = File::create(path)?;
        let s = toml::to_string(self).map_err(io::Error::other)?;
        file.write_all(s.as_bytes())
    }

    /// Read the configuration from TOML.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut s = String::new();
        let mut file = File::open(path)?;
        file.read_to_string(&mut s)?;
        toml::from_str(&s).map_err(io::Error::other)
    }

    /// Generic write: choose format by file extension (.json/.yaml/.yml/.toml).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let p = path.as_ref();
        match extension_of(p).as_deref() {
            Some("json") => self.to_json(p),
            Some("yaml") | Some("yml") => self.to_yaml(p),
            Some("toml") => self.to_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }

    /// Generic read: choose format by file extension (.json/.yaml/.yml/.toml).
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let p = path.as_ref();
        match extension_of(p).as_deref() {
            Some("json") => Self::from_json(p),
            Some("yaml") | Some("yml") => Self::from_yaml(p),
            Some("toml") => Self::from_toml(p),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unsupported file extension",
            )),
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn parses_initial_pose_frame() {
        let frame: TelemetryFrame = serde_json::from_str(
            r#"{
                "sense_x": "6.2785",
                "sense_y": "1.9598",
                "sense_theta": "0.0077",
                "sense_observations_x": "1.5 -2.0 0.25",
                "sense_observations_y": "0.5 3.0 -1.75"
            }"#,
        )
        .unwrap();
        let input = frame.parse().unwrap();
        let pose = input.pose.unwrap();
        assert_approx_eq!(pose.x, 6.2785, 1e-12);
        assert_approx_eq!(pose.theta, 0.0077, 1e-12);
        assert!(input.control.is_none());
        assert_eq!(input.observations.len(), 3);
        assert_eq!(input.observations[1], Observation::new(-2.0, 3.0));
    }

    #[test]
    fn parses_control_frame_with_empty_observations() {
        let frame: TelemetryFrame = serde_json::from_str(
            r#"{
                "previous_velocity": "3.862",
                "previous_yawrate": "-0.0755",
                "sense_observations_x": "",
                "sense_observations_y": ""
            }"#,
        )
        .unwrap();
        let input = frame.parse().unwrap();
        assert!(input.pose.is_none());
        let control = input.control.unwrap();
        assert_approx_eq!(control.velocity, 3.862, 1e-12);
        assert_approx_eq!(control.yaw_rate, -0.0755, 1e-12);
        assert!(input.observations.is_empty());
    }

    #[test]
    fn rejects_partial_pose() {
        let frame = TelemetryFrame {
            sense_x: Some("1.0".into()),
            sense_y: Some("2.0".into()),
            ..TelemetryFrame::default()
        };
        assert!(matches!(frame.parse(), Err(MclError::Telemetry(_))));
    }

    #[test]
    fn rejects_mismatched_observation_lists() {
        let frame = TelemetryFrame {
            sense_observations_x: "1.0 2.0 3.0".into(),
            sense_observations_y: "1.0 2.0".into(),
            ..TelemetryFrame::default()
        };
        assert!(matches!(frame.parse(), Err(MclError::Telemetry(_))));
    }

    #[test]
    fn rejects_unparsable_token() {
        let frame = TelemetryFrame {
            sense_observations_x: "1.0 oops".into(),
            sense_observations_y: "1.0 2.0".into(),
            ..TelemetryFrame::default()
        };
        assert!(matches!(frame.parse(), Err(MclError::Telemetry(_))));
    }

    #[test]
    fn best_particle_message_mirrors_particle() {
        let mut particle = Particle::new(3, 1.25, -2.5, 0.5);
        particle.associations = vec![4, 8];
        particle.sense_x = vec![1.0, 2.0];
        particle.sense_y = vec![-1.0, -2.0];
        let msg = BestParticleMessage::from_particle(&particle);
        assert_approx_eq!(msg.best_particle_x, 1.25, 1e-12);
        assert_eq!(msg.best_particle_associations, "4 8");
        assert_eq!(msg.best_particle_sense_x, "1 2");
        assert_eq!(msg.best_particle_sense_y, "-1 -2");
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: FilterConfig = toml::from_str("num_particles = 500\nseed = 7\n").unwrap();
        assert_eq!(config.num_particles, 500);
        assert_eq!(config.seed, 7);
        assert_approx_eq!(config.sensor_range, 50.0, 1e-12);
        assert_approx_eq!(config.sigma_pos[2], 0.01, 1e-12);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = FilterConfig {
            num_particles: 0,
            ..FilterConfig::default()
        };
        assert!(matches!(config.validate(), Err(MclError::InvalidConfiguration(_))));
        config.num_particles = 10;
        config.sigma_landmark = [0.3, 0.0];
        assert!(matches!(config.validate(), Err(MclError::InvalidConfiguration(_))));
        config.sigma_landmark = [0.3, 0.3];
        config.dt = -0.1;
        assert!(matches!(config.validate(), Err(MclError::InvalidConfiguration(_))));
    }
}
