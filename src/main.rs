use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, trace, warn};
use mask_painter_common::{SimulationConfig, Snapshot};
use mask_painter_engine::MaskPainterSimulation;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for the mask painter simulation", long_about = None)]
struct Args {
    /// Path to the config.toml file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Number of steps to run (overrides run.total_steps)
    #[arg(short, long)]
    steps: Option<u64>,

    /// RNG seed (overrides system.seed)
    #[arg(long)]
    seed: Option<u64>,

    /// Sleep step_function.step_interval milliseconds between steps
    #[arg(long)]
    realtime: bool,
}

fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();
    let args = Args::parse();

    info!("Starting Mask Painter Engine...");

    // --- Load Configuration ---
    let mut config = match SimulationConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}. Falling back to the built-in default profile.", e);
            SimulationConfig::default()
        }
    };
    if let Some(seed) = args.seed {
        config.system.seed = Some(seed);
    }
    let total_steps = args.steps.unwrap_or(config.run.total_steps);
    let record_interval_steps = match config.run.record_interval_steps {
        0 => {
            warn!("Record interval is 0 steps. Recording every step.");
            1
        }
        n => n,
    };

    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Simulation ---
    let mut sim = MaskPainterSimulation::new(config)?;
    let (width, height) = sim.grid_dimensions();
    info!("Exposure grid: {}x{} cells, bounds {:?}.", width, height, sim.grid_bounds());
    debug!("Simulation Parameters: {:#?}", sim.params());

    let step_pause = Duration::from_millis(sim.params().step_interval_ms);
    if args.realtime {
        info!("Realtime mode: {} ms between steps.", step_pause.as_millis());
    }

    // --- Simulation Loop ---
    info!(
        "Starting simulation loop for {} steps, recording every {} steps...",
        total_steps, record_interval_steps
    );
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    sim.record_snapshot();

    for step in 1..=total_steps {
        let step_start_time = Instant::now();
        let report = sim.step();
        let step_duration = step_start_time.elapsed();

        let current_time = Instant::now();
        let should_print_status = current_time.duration_since(previous_print_time).as_secs_f64() >= 5.0;
        let is_record_step = step % record_interval_steps == 0;
        let is_last_step = step == total_steps;

        if is_record_step || is_last_step {
            sim.record_snapshot();
        }

        if should_print_status || is_record_step || is_last_step {
            let (region, cell) = sim.total_catches();
            info!(
                "Step [{}/{}] | Particles: {} | Caught: {} region / {} cell | Coverage: {:.2}% | Elapsed: {:.2} s",
                step,
                total_steps,
                report.particle_count,
                region,
                cell,
                sim.mask_statistics().coverage_percentage,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = current_time;
        } else {
            trace!(
                "Step [{}/{}] completed in {:.2} ms: {:?}",
                step,
                total_steps,
                step_duration.as_secs_f64() * 1000.0,
                report
            );
        }

        if args.realtime {
            std::thread::sleep(step_pause.saturating_sub(step_duration));
        }
    }

    info!("Simulation finished in {:.3} seconds.", start_time.elapsed().as_secs_f64());

    // --- Save Recorded Data ---
    let output = sim.config().output.clone();
    if output.save_stats {
        let format = output.format.as_deref().unwrap_or("json");
        if let Err(e) = write_snapshots(sim.recorded_snapshots(), &output.base_filename, format) {
            error!("Error saving snapshots: {}", e);
        }
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if output.save_positions {
        let filename = format!("{}_final_positions.csv", output.base_filename);
        let mut writer = csv::Writer::from_path(&filename)?;
        writer.write_record(["x", "y"])?;
        for (x, y) in sim.particle_positions() {
            writer.write_record(&[format!("{:.4}", x), format!("{:.4}", y)])?;
        }
        writer.flush()?;
        info!("Final positions saved to {}", filename);
    }

    if output.save_mask {
        let csv_name = format!("{}_mask.csv", output.base_filename);
        write_mask_csv(&sim, &csv_name)?;
        info!("Exposure grid saved to {}", csv_name);

        let bin_name = format!("{}_mask.bin", output.base_filename);
        sim.save_mask(&bin_name)?;
        info!("Raw exposure grid saved to {}", bin_name);
    }

    info!("Simulation Complete.");
    Ok(())
}

/// Writes all snapshots in one of "json", "bincode" or "messagepack".
/// Unknown formats fall back to JSON.
fn write_snapshots(snapshots: &[Snapshot], base_filename: &str, format: &str) -> Result<()> {
    match format {
        "bincode" => {
            let filename = format!("{}_snapshots.bin", base_filename);
            bincode::serialize_into(BufWriter::new(File::create(&filename)?), snapshots)?;
            info!("All snapshots saved to {} (binary format)", filename);
        }
        "messagepack" => {
            let filename = format!("{}_snapshots.msgpack", base_filename);
            rmp_serde::encode::write(&mut BufWriter::new(File::create(&filename)?), snapshots)?;
            info!("All snapshots saved to {} (MessagePack format)", filename);
        }
        other => {
            if other != "json" {
                error!("Unknown output format: {}. Using JSON instead.", other);
            }
            let filename = format!("{}_snapshots.json", base_filename);
            let json_string = serde_json::to_string(snapshots)?;
            File::create(&filename)?.write_all(json_string.as_bytes())?;
            info!("All snapshots saved to {} ({} bytes)", filename, json_string.len());
        }
    }
    Ok(())
}

/// One CSV row per grid row, cells as exposure values.
fn write_mask_csv(sim: &MaskPainterSimulation, filename: &str) -> Result<()> {
    let (width, _) = sim.grid_dimensions();
    let mut writer = csv::Writer::from_path(filename)?;
    for row in sim.exposure_grid().chunks(width) {
        writer.write_record(row.iter().map(|v| format!("{:.5}", v)))?;
    }
    writer.flush()?;
    Ok(())
}
