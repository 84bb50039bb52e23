//! Fixed-capacity ring buffer of derived samples
//!
//! Layout is one array per field, all indexed by slot. There is a single
//! writer (the acquisition loop) and any number of readers. Nothing here
//! takes a lock:
//! - every field is an `AtomicU64` holding `f64` bits, so a single value is
//!   never torn
//! - the publish count is stored with `Release` after the slot is filled,
//!   so a reader that sees the new count sees the new slot
//! - there is no guarantee across the fields of one slot; a reader racing
//!   a wrap can see a mix of old and new fields for the oldest slot
//!
//! Once the buffer wraps the oldest slot is silently overwritten.

use crate::atomic::AtomicF64;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of per-slot fields
pub const FIELD_COUNT: usize = 13;

/// One tick's published record
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedSample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Signed flow: positive inspiratory, negative expiratory
    pub flow: f64,
    /// Running volume, normalized per minute with the last cycle's length
    pub volume: f64,
    /// Tidal volume of the last completed cycle
    pub tidal: f64,
    pub pmin: f64,
    pub pmax: f64,
    /// Expiration time of the last completed cycle (s)
    pub expire_duration: f64,
    pub in_pressure_a: f64,
    pub in_pressure_b: f64,
    pub in_flow: f64,
    pub ex_pressure_a: f64,
    pub ex_pressure_b: f64,
    pub ex_flow: f64,
}

/// Column selector for per-field reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Timestamp,
    Flow,
    Volume,
    Tidal,
    Pmin,
    Pmax,
    ExpireDuration,
    InPressureA,
    InPressureB,
    InFlow,
    ExPressureA,
    ExPressureB,
    ExFlow,
}

impl Field {
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::Timestamp,
        Field::Flow,
        Field::Volume,
        Field::Tidal,
        Field::Pmin,
        Field::Pmax,
        Field::ExpireDuration,
        Field::InPressureA,
        Field::InPressureB,
        Field::InFlow,
        Field::ExPressureA,
        Field::ExPressureB,
        Field::ExFlow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Timestamp => "timestamp",
            Field::Flow => "flow",
            Field::Volume => "volume",
            Field::Tidal => "tidal",
            Field::Pmin => "pmin",
            Field::Pmax => "pmax",
            Field::ExpireDuration => "expire_duration",
            Field::InPressureA => "in_pressure_a",
            Field::InPressureB => "in_pressure_b",
            Field::InFlow => "in_flow",
            Field::ExPressureA => "ex_pressure_a",
            Field::ExPressureB => "ex_pressure_b",
            Field::ExFlow => "ex_flow",
        }
    }
}

impl DerivedSample {
    fn to_fields(self) -> [f64; FIELD_COUNT] {
        [
            self.timestamp,
            self.flow,
            self.volume,
            self.tidal,
            self.pmin,
            self.pmax,
            self.expire_duration,
            self.in_pressure_a,
            self.in_pressure_b,
            self.in_flow,
            self.ex_pressure_a,
            self.ex_pressure_b,
            self.ex_flow,
        ]
    }

    fn from_fields(f: [f64; FIELD_COUNT]) -> Self {
        Self {
            timestamp: f[0],
            flow: f[1],
            volume: f[2],
            tidal: f[3],
            pmin: f[4],
            pmax: f[5],
            expire_duration: f[6],
            in_pressure_a: f[7],
            in_pressure_b: f[8],
            in_flow: f[9],
            ex_pressure_a: f[10],
            ex_pressure_b: f[11],
            ex_flow: f[12],
        }
    }
}

/// Lock-free single-writer ring buffer shared with monitoring readers
#[derive(Debug)]
pub struct SampleStore {
    capacity: usize,
    /// Samples published since creation; slot index is derived from it
    published: AtomicU64,
    columns: [Box<[AtomicF64]>; FIELD_COUNT],
}

impl SampleStore {
    /// Create a store holding `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            published: AtomicU64::new(0),
            columns: std::array::from_fn(|_| (0..capacity).map(|_| AtomicF64::default()).collect()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples published since creation
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Slot holding the most recent sample, `None` before the first publish
    pub fn slot_index(&self) -> Option<usize> {
        match self.published() {
            0 => None,
            n => Some(((n - 1) % self.capacity as u64) as usize),
        }
    }

    /// Write `sample` into the next slot and advance the index
    ///
    /// Must only be called from the single writer.
    pub fn publish(&self, sample: &DerivedSample) -> usize {
        let n = self.published.load(Ordering::Relaxed);
        let slot = (n % self.capacity as u64) as usize;
        for (column, value) in self.columns.iter().zip(sample.to_fields()) {
            column[slot].store(value, Ordering::Relaxed);
        }
        self.published.store(n + 1, Ordering::Release);
        slot
    }

    /// Read one slot; `None` if out of range or never written
    pub fn read(&self, slot: usize) -> Option<DerivedSample> {
        if slot >= self.capacity || slot as u64 >= self.published() {
            return None;
        }
        let mut fields = [0.0f64; FIELD_COUNT];
        for (value, column) in fields.iter_mut().zip(self.columns.iter()) {
            *value = column[slot].load(Ordering::Relaxed);
        }
        Some(DerivedSample::from_fields(fields))
    }

    /// Read a single field of one slot
    pub fn value(&self, field: Field, slot: usize) -> Option<f64> {
        if slot >= self.capacity || slot as u64 >= self.published() {
            return None;
        }
        Some(self.columns[field as usize][slot].load(Ordering::Relaxed))
    }

    /// Most recent sample
    pub fn latest(&self) -> Option<DerivedSample> {
        self.slot_index().and_then(|slot| self.read(slot))
    }

    /// Up to `count` most recent samples, oldest first
    pub fn recent(&self, count: usize) -> Vec<DerivedSample> {
        let published = self.published();
        let available = published.min(self.capacity as u64);
        let n = (count as u64).min(available);
        ((published - n)..published)
            .filter_map(|k| self.read((k % self.capacity as u64) as usize))
            .collect()
    }
}
