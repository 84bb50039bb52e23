//! Breath computation module
//!
//! This module contains all per-tick breath functionality including:
//! - Venturi flow derivation ([`flow`])
//! - Inspiration/expiration cycle tracking ([`cycle`])
//! - Patient-initiated breath detection ([`spontaneous`])
//! - The shared valve signal and a simulated valve controller ([`valve`])

pub mod cycle;
pub mod flow;
pub mod spontaneous;
pub mod valve;
