//! Command line parsing
//!
//! Flags override the matching config file values.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ArgsError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),

    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: &'static str, value: String },

    #[error("Unknown argument: {0}")]
    Unknown(String),
}

/// What the process was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(RunOptions),
    Version,
    Help,
}

/// Overrides for a monitoring run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub capacity: Option<usize>,
    pub assist: Option<f64>,
    pub replay: Option<PathBuf>,
}

/// Parse arguments, excluding the program name
pub fn parse_args<I>(args: I) -> Result<Command, ArgsError>
where
    I: IntoIterator<Item = String>,
{
    let mut options = RunOptions::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-v" => return Ok(Command::Version),
            "--help" | "-h" => return Ok(Command::Help),
            "--config" | "-c" => {
                options.config = Some(value(&mut args, "--config")?.into());
            }
            "--log-dir" | "-o" => {
                options.log_dir = Some(value(&mut args, "--log-dir")?.into());
            }
            "--replay" => {
                options.replay = Some(value(&mut args, "--replay")?.into());
            }
            "--capacity" | "-n" => {
                let raw = value(&mut args, "--capacity")?;
                match raw.parse::<usize>() {
                    Ok(n) if n > 0 => options.capacity = Some(n),
                    _ => {
                        return Err(ArgsError::InvalidValue {
                            flag: "--capacity",
                            value: raw,
                        })
                    }
                }
            }
            "--assist" | "-a" => {
                let raw = value(&mut args, "--assist")?;
                match raw.parse::<f64>() {
                    Ok(pa) if pa.is_finite() => options.assist = Some(pa),
                    _ => {
                        return Err(ArgsError::InvalidValue {
                            flag: "--assist",
                            value: raw,
                        })
                    }
                }
            }
            _ => return Err(ArgsError::Unknown(arg)),
        }
    }

    Ok(Command::Run(options))
}

fn value(args: &mut impl Iterator<Item = String>, flag: &'static str) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue(flag))
}

pub fn print_help() {
    println!("Usage: ventmon [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config PATH       Config file (default: <data dir>/ventmon/config.json)");
    println!("  -o, --log-dir DIR       Directory for session logs");
    println!("  -n, --capacity N        Ring buffer capacity in samples");
    println!("  -a, --assist PA         Spontaneous breath threshold, 0 disables assist");
    println!("      --replay FILE       Replay a recorded session log instead of sensors");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  ventmon --assist 10 --log-dir /var/log/ventmon");
    println!("  ventmon --replay 2026-03-04-05-06-07.out");
    println!();
    println!("Without hardware, a simulated patient circuit is sampled.");
}
