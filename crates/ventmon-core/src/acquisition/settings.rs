//! Clinician settings shared with the acquisition loop
//!
//! The settings collaborator validates values and writes them here; the
//! acquisition loop only reads. Each field is its own atomic, so an update
//! touching several fields can be observed half-applied for one tick.

use crate::atomic::AtomicF64;
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;

fn default_respiratory_rate() -> f64 {
    15.0
}

fn default_tidal_volume() -> f64 {
    500.0
}

fn default_peep() -> f64 {
    5.0
}

fn default_fio2() -> f64 {
    21.0
}

/// Clinician-set ventilation targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Breaths per minute
    #[serde(rename = "RR", default = "default_respiratory_rate")]
    pub respiratory_rate: f64,
    /// Tidal-volume target (mL)
    #[serde(rename = "VT", default = "default_tidal_volume")]
    pub tidal_volume: f64,
    /// Positive end-expiratory pressure (cmH2O)
    #[serde(rename = "PEEP", default = "default_peep")]
    pub peep: f64,
    /// Oxygen fraction (%)
    #[serde(rename = "FiO2", default = "default_fio2")]
    pub fio2: f64,
    /// Spontaneous-breath trigger depth (Pa); `<= 0` disables assist
    #[serde(rename = "assist", default)]
    pub assist_threshold: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            respiratory_rate: default_respiratory_rate(),
            tidal_volume: default_tidal_volume(),
            peep: default_peep(),
            fio2: default_fio2(),
            assist_threshold: 0.0,
        }
    }
}

/// Partial settings update; absent keys are left untouched
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct SettingsUpdate {
    #[serde(rename = "RR")]
    respiratory_rate: Option<f64>,
    #[serde(rename = "VT")]
    tidal_volume: Option<f64>,
    #[serde(rename = "PEEP")]
    peep: Option<f64>,
    #[serde(rename = "FiO2")]
    fio2: Option<f64>,
    #[serde(rename = "assist")]
    assist_threshold: Option<f64>,
}

/// Lock-free settings cell read by the acquisition loop every tick
#[derive(Debug)]
pub struct SharedSettings {
    respiratory_rate: AtomicF64,
    tidal_volume: AtomicF64,
    peep: AtomicF64,
    fio2: AtomicF64,
    assist_threshold: AtomicF64,
}

impl SharedSettings {
    pub fn new(initial: Settings) -> Self {
        Self {
            respiratory_rate: AtomicF64::new(initial.respiratory_rate),
            tidal_volume: AtomicF64::new(initial.tidal_volume),
            peep: AtomicF64::new(initial.peep),
            fio2: AtomicF64::new(initial.fio2),
            assist_threshold: AtomicF64::new(initial.assist_threshold),
        }
    }

    /// Replace every field
    pub fn apply(&self, settings: &Settings) {
        self.respiratory_rate.store(settings.respiratory_rate, Ordering::Release);
        self.tidal_volume.store(settings.tidal_volume, Ordering::Release);
        self.peep.store(settings.peep, Ordering::Release);
        self.fio2.store(settings.fio2, Ordering::Release);
        self.assist_threshold.store(settings.assist_threshold, Ordering::Release);
        tracing::info!(
            rr = settings.respiratory_rate,
            vt = settings.tidal_volume,
            peep = settings.peep,
            fio2 = settings.fio2,
            assist = settings.assist_threshold,
            "Settings applied"
        );
    }

    /// Apply a JSON object carrying any subset of `RR`, `VT`, `PEEP`,
    /// `FiO2` and `assist`
    pub fn apply_json(&self, json: &str) -> Result<(), serde_json::Error> {
        let update: SettingsUpdate = serde_json::from_str(json)?;
        let fields = [
            (&self.respiratory_rate, update.respiratory_rate),
            (&self.tidal_volume, update.tidal_volume),
            (&self.peep, update.peep),
            (&self.fio2, update.fio2),
            (&self.assist_threshold, update.assist_threshold),
        ];
        for (slot, value) in fields {
            if let Some(value) = value {
                slot.store(value, Ordering::Release);
            }
        }
        tracing::debug!(?update, "Settings updated");
        Ok(())
    }

    pub fn snapshot(&self) -> Settings {
        Settings {
            respiratory_rate: self.respiratory_rate.load(Ordering::Acquire),
            tidal_volume: self.tidal_volume.load(Ordering::Acquire),
            peep: self.peep.load(Ordering::Acquire),
            fio2: self.fio2.load(Ordering::Acquire),
            assist_threshold: self.assist_threshold.load(Ordering::Acquire),
        }
    }

    pub fn assist_threshold(&self) -> f64 {
        self.assist_threshold.load(Ordering::Acquire)
    }

    pub fn set_assist_threshold(&self, threshold: f64) {
        self.assist_threshold.store(threshold, Ordering::Release);
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
