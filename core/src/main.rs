//! MCL: landmark-based Monte Carlo localization replay tool.
//!
//! Loads a landmark map and a recorded telemetry stream, runs the particle filter over
//! every frame, and writes the per-cycle best-pose estimates. Parameters come from a
//! configuration file (TOML/JSON/YAML) or individual command-line flags; flags override
//! the file.

use clap::Parser;
use log::{info, warn};
use std::error::Error;
use std::f64::consts::TAU;
use std::io::Write;
use std::path::PathBuf;

use mcl::map::Map;
use mcl::messages::FilterConfig;
use mcl::sim::{EstimateRecord, load_telemetry, run_filter};

/// Command line arguments
#[derive(Parser)]
#[command(
    author,
    version,
    about = "Landmark-based Monte Carlo localization over recorded telemetry."
)]
struct Cli {
    /// Load filter parameters from a configuration file (TOML/JSON/YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Landmark map: tab-separated `x y id` rows
    #[arg(short, long)]
    map: PathBuf,

    /// Recorded telemetry stream, one JSON frame per line
    #[arg(short, long)]
    telemetry: PathBuf,

    /// Write per-cycle estimates to this CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of particles
    #[arg(long)]
    particles: Option<usize>,

    /// GPS/pose noise standard deviations: x [m], y [m], theta [rad]
    #[arg(long, num_args = 3, value_names = ["X", "Y", "THETA"])]
    std_gps: Option<Vec<f64>>,

    /// Landmark measurement noise standard deviations: x [m], y [m]
    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    std_landmark: Option<Vec<f64>>,

    /// Sensor range [m]
    #[arg(long)]
    sensor_range: Option<f64>,

    /// Time between telemetry frames [s]
    #[arg(long)]
    dt: Option<f64>,

    /// Grid cell size [m]
    #[arg(long)]
    cell_size: Option<f64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log file path (if not specified, logs to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Initialize the logger with the specified configuration.
fn init_logger(log_level: &str, log_file: Option<&PathBuf>) -> Result<(), Box<dyn Error>> {
    let level = log_level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', defaulting to 'info'", log_level);
        log::LevelFilter::Info
    });

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.args()
        )
    });

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let target = Box::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(log_path)?,
        );
        builder.target(env_logger::Target::Pipe(target));
    }

    builder.try_init()?;
    Ok(())
}

fn build_config(cli: &Cli) -> Result<FilterConfig, Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => FilterConfig::from_file(path)?,
        None => FilterConfig::default(),
    };
    if let Some(particles) = cli.particles {
        config.num_particles = particles;
    }
    if let Some(std_gps) = &cli.std_gps {
        config.sigma_pos = [std_gps[0], std_gps[1], std_gps[2]];
    }
    if let Some(std_landmark) = &cli.std_landmark {
        config.sigma_landmark = [std_landmark[0], std_landmark[1]];
    }
    if let Some(sensor_range) = cli.sensor_range {
        config.sensor_range = sensor_range;
    }
    if let Some(dt) = cli.dt {
        config.dt = dt;
    }
    if let Some(cell_size) = cli.cell_size {
        config.cell_size = cell_size;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    // A yaw std-dev past a full turn adds nothing but wrap-around aliasing.
    if config.sigma_pos[2] > TAU {
        warn!(
            "yaw std-dev {} exceeds 2π, clamping to {TAU}",
            config.sigma_pos[2]
        );
        config.sigma_pos[2] = TAU;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.log_file.as_ref())?;

    let config = build_config(&cli)?;
    info!(
        "{} particles, sigma_pos {:?}, sigma_landmark {:?}, sensor range {} m, seed {}",
        config.num_particles, config.sigma_pos, config.sigma_landmark, config.sensor_range,
        config.seed
    );

    let map = Map::from_csv(&cli.map)?;
    info!("loaded {} landmarks from {}", map.len(), cli.map.display());

    let frames = load_telemetry(&cli.telemetry)?;
    info!(
        "loaded {} telemetry frames from {}",
        frames.len(),
        cli.telemetry.display()
    );

    let responses = run_filter(&config, &map, &frames)?;
    if let Some(last) = responses.last() {
        info!(
            "final estimate: x {:.3}, y {:.3}, theta {:.4}",
            last.best_particle_x, last.best_particle_y, last.best_particle_theta
        );
    }

    if let Some(output) = &cli.output {
        let records: Vec<EstimateRecord> = responses
            .iter()
            .enumerate()
            .map(|(step, message)| EstimateRecord::from_message(step, message))
            .collect();
        EstimateRecord::to_csv(&records, output)?;
        info!("wrote {} estimates to {}", records.len(), output.display());
    }

    Ok(())
}
