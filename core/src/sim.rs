//! Offline telemetry replay.
//!
//! The live transport session is out of scope for the core; this module stands in for
//! it by replaying recorded telemetry frames (JSON lines, one frame per line) through
//! the full localization cycle and collecting the per-cycle best-particle responses.
//! The spatial grid is built once from the map before the loop starts; each frame then
//! runs init-or-predict → update → resample to completion before the next frame is
//! touched.

use crate::filter::ParticleFilter;
use crate::grid::SpatialGrid;
use crate::map::Map;
use crate::messages::{BestParticleMessage, FilterConfig, TelemetryFrame};
use crate::{MclError, Result};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// One row of the estimate table written after a replay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub step: usize,
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub associations: String,
    pub sense_x: String,
    pub sense_y: String,
}

impl EstimateRecord {
    pub fn from_message(step: usize, message: &BestParticleMessage) -> EstimateRecord {
        EstimateRecord {
            step,
            x: message.best_particle_x,
            y: message.best_particle_y,
            theta: message.best_particle_theta,
            associations: message.best_particle_associations.clone(),
            sense_x: message.best_particle_sense_x.clone(),
            sense_y: message.best_particle_sense_y.clone(),
        }
    }

    /// Write records to a CSV file with a header row.
    pub fn to_csv<P: AsRef<Path>>(records: &[EstimateRecord], path: P) -> io::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Load a JSON-lines telemetry recording: one [`TelemetryFrame`] per non-blank line.
///
/// # Errors
/// [`MclError::Io`] if the file cannot be read, [`MclError::Telemetry`] if a line does
/// not decode.
pub fn load_telemetry<P: AsRef<Path>>(path: P) -> Result<Vec<TelemetryFrame>> {
    let contents = fs::read_to_string(path.as_ref())?;
    let mut frames = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let frame: TelemetryFrame = serde_json::from_str(line).map_err(|e| {
            MclError::Telemetry(format!(
                "{} line {}: {e}",
                path.as_ref().display(),
                lineno + 1
            ))
        })?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Replay `frames` through the full localization cycle and return the per-cycle
/// best-particle responses.
///
/// Builds the spatial grid once from `map` (bounding rectangle expanded by the
/// configured margin, search radius equal to the sensor range), seeds the filter from
/// the config, then per frame: initialize from the frame's pose estimate (first frame)
/// or predict from its control inputs, update weights against the frame's observations,
/// and resample.
///
/// # Errors
/// Configuration, geometry, and telemetry errors from the layers involved; a first
/// frame without a pose estimate or a later frame without control inputs is a
/// [`MclError::Telemetry`] error.
pub fn run_filter(
    config: &FilterConfig,
    map: &Map,
    frames: &[TelemetryFrame],
) -> Result<Vec<BestParticleMessage>> {
    config.validate()?;
    let bounds = map
        .bounds()
        .ok_or_else(|| MclError::Map("map contains no landmarks".into()))?
        .expanded(config.world_margin);
    let mut grid = SpatialGrid::new(bounds, config.cell_size, config.sensor_range)?;
    grid.extend(map.landmarks.iter().copied())?;
    info!(
        "grid: {:?} cells over ({:.1}, {:.1}) .. ({:.1}, {:.1}), {} landmarks",
        grid.dims(),
        bounds.x0,
        bounds.y0,
        bounds.x1,
        bounds.y1,
        grid.len()
    );

    let mut pf = ParticleFilter::new_with_seed(config.num_particles, config.seed)?;
    let mut responses = Vec::with_capacity(frames.len());
    for (step, frame) in frames.iter().enumerate() {
        let input = frame.parse()?;
        if !pf.initialized() {
            let pose = input.pose.ok_or_else(|| {
                MclError::Telemetry(format!("frame {step}: first frame carries no pose estimate"))
            })?;
            pf.init(pose.x, pose.y, pose.theta, config.sigma_pos)?;
        } else {
            let control = input.control.ok_or_else(|| {
                MclError::Telemetry(format!("frame {step}: no control inputs"))
            })?;
            pf.predict(config.dt, control.velocity, control.yaw_rate)?;
        }
        pf.update_weights(
            config.sensor_range,
            config.sigma_landmark,
            &input.observations,
            &grid,
        )?;
        pf.resample()?;

        let weights = pf.weights();
        let highest = weights.iter().copied().fold(0.0, f64::max);
        let average = weights.iter().sum::<f64>() / weights.len() as f64;
        debug!("step {step}: highest weight {highest:.4e}, average weight {average:.4e}");

        let best = pf
            .best_particle()
            .expect("particle filter has no particles");
        responses.push(BestParticleMessage::from_particle(best));
    }
    info!(
        "replayed {} frames, average of {:.1} landmarks examined per query",
        frames.len(),
        pf.average_search()
    );
    Ok(responses)
}
