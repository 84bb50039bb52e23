//! Ventmon - Ventilator monitor acquisition core
//!
//! Entry point: calibrates the sensors, runs the acquisition loop on its own
//! thread, and prints a status line until Ctrl+C or a fatal error.

use anyhow::{Context, Result};
use chrono::Local;
use std::time::Duration;
use tracing::{error, info, warn};
use ventmon::acquisition::clock::SystemClock;
use ventmon::breath::spontaneous::SpontaneousBreathDetector;
use ventmon::breath::valve::ValveCycler;
use ventmon::cli::{self, Command, RunOptions};
use ventmon::config::MonitorConfig;
use ventmon::sensor::replay::ReplaySession;
use ventmon::sensor::sim::PatientCircuit;
use ventmon::sensor::SensorError;
use ventmon::{
    Acquisition, AcquisitionError, Calibrator, MonitorContext, SampleLogger, Scheduler, SensorBank,
};

/// Queued spontaneous-breath events awaiting the status loop
const EVENT_QUEUE: usize = 64;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("ventmon=info,ventmon_core=info")
            }),
        )
        .init();

    let options = match cli::parse_args(std::env::args().skip(1)) {
        Ok(Command::Version) => {
            println!("ventmon {} ({})", ventmon::VERSION, ventmon::BUILD_DATE);
            return Ok(());
        }
        Ok(Command::Help) => {
            cli::print_help();
            return Ok(());
        }
        Ok(Command::Run(options)) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            cli::print_help();
            std::process::exit(2);
        }
    };

    println!("Ventmon v{} - Ventilator Monitor", ventmon::VERSION);
    println!();

    run(options)
}

fn run(options: RunOptions) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => MonitorConfig::load_from(path),
        None => MonitorConfig::load(),
    };
    if let Some(dir) = options.log_dir {
        config.log_dir = dir;
    }
    if let Some(capacity) = options.capacity {
        config.capacity = capacity;
    }
    if let Some(assist) = options.assist {
        config.settings.assist_threshold = assist;
    }

    let period = config.tick_period();
    let context = MonitorContext::new(config.capacity, config.settings);

    // Set up Ctrl+C handler
    let stop_context = context.clone();
    ctrlc::set_handler(move || stop_context.request_stop())
        .context("Failed to install Ctrl+C handler")?;

    let replay = match &options.replay {
        Some(path) => Some(ReplaySession::open(path)?),
        None => None,
    };
    let ports = match &replay {
        Some(session) => session.sensors(),
        None => PatientCircuit::new(context.flag().clone(), config.circuit_params()).sensors(),
    };

    let logger = SampleLogger::create(&config.log_dir, &Local::now())?;
    let (detector, events) = SpontaneousBreathDetector::with_events(EVENT_QUEUE);
    let mut acquisition = Acquisition::new(SensorBank::from_ports(ports), logger, context.clone())
        .with_detector(detector)
        .with_calibrator(Calibrator::new(config.prime_reads, period));

    // Recorded pressures are already zeroed, and the log drives the valve
    if let Some(session) = &replay {
        acquisition = acquisition.with_replay_valve(session.valve());
    } else {
        let report = acquisition.calibrate(&SystemClock)?;
        info!(residual_max = report.residual_max, "Sensors calibrated");
    }

    let valve = match replay {
        Some(_) => None,
        None => {
            let cycler = ValveCycler::new(config.simulation.rate_bpm, config.simulation.duty);
            Some(cycler.spawn(context.flag().clone(), context.running_flag(), period)?)
        }
    };

    let handle = Scheduler::new(acquisition, SystemClock, period).spawn()?;

    println!("Monitoring started. Press Ctrl+C to stop.");
    println!();

    // Status loop
    let mut last_status = String::new();
    while handle.is_alive() {
        for event in events.try_iter() {
            println!(
                "Spontaneous breath at {:.3} ({:.1} Pa, threshold {:.1} Pa)",
                event.timestamp, event.pressure, event.threshold
            );
        }

        if let Some(sample) = context.live_sample() {
            let status_line = format!(
                "Flow: {:>8.2} | Volume: {:>9.2} | Tidal: {:>9.2} | Pmin: {:>7.1} | Pmax: {:>7.1} | Exp: {:>5.2}s",
                sample.flow,
                sample.volume,
                sample.tidal,
                sample.pmin,
                sample.pmax,
                sample.expire_duration
            );
            // Only print if changed (reduce spam)
            if status_line != last_status {
                println!("{}", status_line);
                last_status = status_line;
            }
        }

        std::thread::sleep(Duration::from_millis(500));
    }

    let result = handle.join();
    context.request_stop();
    if let Some(valve) = valve {
        if valve.join().is_err() {
            warn!("Valve cycler thread panicked");
        }
    }

    println!();
    match result {
        Ok(ticks) => {
            println!("Stopped after {} ticks.", ticks);
            Ok(())
        }
        Err(AcquisitionError::Sensor(SensorError::Exhausted(reads))) => {
            println!("Replay finished after {} records.", reads);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Acquisition stopped on a fatal error");
            Err(e.into())
        }
    }
}
