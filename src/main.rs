//! CLI entry point for sensor-hal
//!
//! Inspects the device registries and opens devices by URI:
//!
//! ```bash
//! sensor-hal schemes --category camera
//! sensor-hal aliases
//! sensor-hal sample 'convert:[fmt=RGB8]//test://?width=64&height=48' --category camera --frames 5
//! sensor-hal config
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sensor_hal::config::HalConfig;
use sensor_hal::logging::{self, LoggingConfig, OutputFormat};
use sensor_hal::messages::{CameraMsg, EncoderMsg, ImuMsg, LidarMsg, PosysMsg};
use sensor_hal::{DeviceCategory, Hal, HalError};
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "sensor-hal")]
#[command(about = "URI-addressed sensor hardware abstraction layer", long_about = None)]
struct Cli {
    /// Configuration file (default: config/sensor_hal.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: OutputFormat,

    /// Route device creation to the simulator
    #[arg(long, global = true)]
    sim: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered factories and their parameters
    Schemes {
        /// Only this category (default: all)
        #[arg(long)]
        category: Option<DeviceCategory>,
    },

    /// List registered aliases
    Aliases {
        /// Only this category (default: all)
        #[arg(long)]
        category: Option<DeviceCategory>,
    },

    /// Open a device and print a summary of captured messages
    Sample {
        /// Device URI
        uri: String,

        /// Device category
        #[arg(long)]
        category: DeviceCategory,

        /// Number of messages to capture
        #[arg(long, default_value = "1")]
        frames: usize,

        /// Device type used in simulation mode (e.g. Camera)
        #[arg(long)]
        hint: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => HalConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => HalConfig::load().context("Failed to load configuration")?,
    };
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    if cli.sim {
        config.simulation.enabled = true;
    }

    logging::init(LoggingConfig::from_hal_config(&config)?.with_format(cli.log_format))?;
    debug!(?config, "Configuration loaded");

    if let Commands::Config = cli.command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let hal = Hal::from_config(&config)?;

    match cli.command {
        Commands::Schemes { category } => list_schemes(&hal, category),
        Commands::Aliases { category } => list_aliases(&hal, category),
        Commands::Sample {
            uri,
            category,
            frames,
            hint,
        } => sample(&hal, &uri, category, frames, hint.as_deref())
            .with_context(|| format!("Sampling {uri} failed")),
        Commands::Config => Ok(()),
    }
}

fn selected(category: Option<DeviceCategory>) -> Vec<DeviceCategory> {
    category.map_or_else(|| DeviceCategory::ALL.to_vec(), |c| vec![c])
}

fn list_schemes(hal: &Hal, category: Option<DeviceCategory>) -> Result<()> {
    for category in selected(category) {
        println!("{category}:");
        for factory in hal.factories(category) {
            println!("  {:<10} {}", factory.scheme, factory.name);
            for param in factory.params {
                println!(
                    "      {}={:<10} {}",
                    param.name, param.default, param.description
                );
            }
        }
    }
    Ok(())
}

fn list_aliases(hal: &Hal, category: Option<DeviceCategory>) -> Result<()> {
    for category in selected(category) {
        println!("{category}:");
        for (name, target) in hal.aliases(category) {
            println!("  {name} -> {target}");
        }
    }
    Ok(())
}

fn sample(
    hal: &Hal,
    uri: &str,
    category: DeviceCategory,
    frames: usize,
    hint: Option<&str>,
) -> Result<()> {
    info!(%uri, %category, frames, "Probing device");

    match category {
        DeviceCategory::Camera => {
            let camera = hal.cameras().create(uri, hint)?;
            for channel in 0..camera.num_channels() {
                println!(
                    "channel {channel}: {}x{}",
                    camera.width(channel),
                    camera.height(channel)
                );
            }
            capture_n(frames, || camera.capture(), describe_camera)?;
            hal.cameras().destroy(camera);
        }
        DeviceCategory::Imu => {
            let imu = hal.imus().create(uri, hint)?;
            capture_n(frames, || imu.capture(), describe_imu)?;
            hal.imus().destroy(imu);
        }
        DeviceCategory::Lidar => {
            let lidar = hal.lidars().create(uri, hint)?;
            capture_n(frames, || lidar.capture(), describe_lidar)?;
            hal.lidars().destroy(lidar);
        }
        DeviceCategory::Encoder => {
            let encoder = hal.encoders().create(uri, hint)?;
            capture_n(frames, || encoder.capture(), describe_encoder)?;
            hal.encoders().destroy(encoder);
        }
        DeviceCategory::Posys => {
            let posys = hal.posys().create(uri, hint)?;
            capture_n(frames, || posys.capture(), describe_posys)?;
            hal.posys().destroy(posys);
        }
    }
    Ok(())
}

/// Capture up to `frames` messages, stopping quietly at end of stream.
fn capture_n<M>(
    frames: usize,
    mut capture: impl FnMut() -> Result<M, HalError>,
    describe: fn(&M) -> String,
) -> Result<()> {
    for n in 0..frames {
        match capture() {
            Ok(msg) => println!("[{n}] {}", describe(&msg)),
            Err(e) if e.is_stream_end() => {
                info!(captured = n, "Stream ended");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn describe_camera(msg: &CameraMsg) -> String {
    let images: Vec<String> = msg
        .images
        .iter()
        .map(|img| format!("{}x{} {:?}/{:?}", img.width, img.height, img.format, img.pixel_type))
        .collect();
    format!("t={:.6} images=[{}]", msg.device_time, images.join(", "))
}

fn describe_imu(msg: &ImuMsg) -> String {
    format!(
        "t={:.6} accel={:?} gyro={:?} mag={:?}",
        msg.device_time, msg.accel, msg.gyro, msg.mag
    )
}

fn describe_lidar(msg: &LidarMsg) -> String {
    format!(
        "t={:.6} angle={:.2} returns={}",
        msg.device_time,
        msg.rotational_position,
        msg.distances.len()
    )
}

fn describe_encoder(msg: &EncoderMsg) -> String {
    let ticks: Vec<String> = msg
        .label
        .iter()
        .zip(&msg.data)
        .map(|(label, ticks)| format!("{label}={ticks}"))
        .collect();
    format!("t={:.6} {}", msg.device_time, ticks.join(" "))
}

fn describe_posys(msg: &PosysMsg) -> String {
    format!("t={:.6} id={} pose={:?}", msg.device_time, msg.id, msg.pose)
}
