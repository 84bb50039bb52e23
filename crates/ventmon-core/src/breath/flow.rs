//! Venturi flow derivation
//!
//! Flow through a venturi is proportional to the square root of the
//! pressure drop across it. The raw value is always non-negative; the
//! breath engine assigns the sign from the side that produced the pair.

use crate::sensor::SensorPair;

/// Converts a differential pressure into volumetric flow
#[derive(Debug, Clone, Copy)]
pub struct FlowComputer {
    vco: f64,
}

impl FlowComputer {
    pub fn new(vco: f64) -> Self {
        Self { vco }
    }

    /// `vco * sqrt(|p_b - p_a|)`
    pub fn flow(&self, p_a: f64, p_b: f64) -> f64 {
        self.vco * (p_b - p_a).abs().sqrt()
    }

    pub fn pair_flow(&self, pair: &SensorPair) -> f64 {
        self.flow(pair.p_a, pair.p_b)
    }

    pub fn vco(&self) -> f64 {
        self.vco
    }
}

impl Default for FlowComputer {
    fn default() -> Self {
        Self::new(crate::VCO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_differential() {
        let fc = FlowComputer::default();
        assert_eq!(fc.flow(12.5, 12.5), 0.0);
    }

    #[test]
    fn test_known_value() {
        let fc = FlowComputer::default();
        assert_relative_eq!(fc.flow(0.0, 16.0), crate::VCO * 4.0);
    }

    #[test]
    fn test_non_negative_and_symmetric() {
        let fc = FlowComputer::default();
        let pairs = [
            (0.0, 1.0),
            (-250.0, 30.0),
            (1e-9, 0.0),
            (101_325.0, 101_300.5),
            (-4000.0, 4000.0),
        ];
        for (a, b) in pairs {
            let forward = fc.flow(a, b);
            let backward = fc.flow(b, a);
            assert!(forward >= 0.0);
            assert!(!forward.is_nan());
            assert_eq!(forward, backward, "flow({}, {}) not symmetric", a, b);
        }
    }

    #[test]
    fn test_pair_flow() {
        let fc = FlowComputer::new(1.0);
        assert_relative_eq!(fc.pair_flow(&SensorPair::new(9.0, 0.0)), 3.0);
    }
}
