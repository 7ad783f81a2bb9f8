//! Runtime configuration: thresholds, bounds, topology and policy switches.
//!
//! A [`Config`] is fixed when the slave is configured and never mutated by
//! the pipeline. The defaults are the shipped calibration for the reference
//! 20p12s16m pack sampled at 20 ms.

use crate::{TP_MAX_SAMPLES, TP_PARAMS};

/// Grammar-strictness switches for the Transition Period recogniser.
///
/// A "strong" switch turns a tolerated irregularity (which the counting pass
/// folds into an adjacent group) into a disqualifying one.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyFlags {
    /// Require one endpoint of the TP to be at open circuit.
    pub strong_tp_type: bool,
    /// Forbid SLOPE samples between point A and the QCC group.
    pub strong_a_left: bool,
    /// Forbid SLOPE samples between the tail group and point D.
    pub strong_d_right: bool,
    /// Forbid JUMP samples in opposing directions.
    pub strong_jump: bool,
    /// Forbid SLOPE samples opposing the jump direction.
    pub strong_slope: bool,
    /// Forbid SLOPE samples inside the jump group.
    pub strong_jump_slope: bool,
    /// Forbid TAIL/QCC samples inside the slope group.
    pub strong_slope_tail: bool,
    /// Forbid SLOPE samples inside the pre-jump QCC window.
    pub strong_qcc: bool,
    /// Require a non-empty slope group.
    pub slope_must_exist: bool,
    /// Require the voltage and current jump groups to end together.
    pub align_slopes: bool,
    /// Forbid JUMP samples inside the tail group.
    pub strong_tail: bool,
}

/// Immutable estimator configuration.
#[derive(Clone, Debug)]
pub struct Config {
    // General
    /// Nominal sampling period, microseconds.
    pub avg_sampling_us: u32,
    /// Nominal single-cell capacity, milliampere-hours.
    pub cell_capacity_mah: u32,
    /// State-of-charge at session start, tenths of a percent.
    pub initial_soc_tenths: u32,
    /// Values with magnitude below this are treated as zero.
    pub zero_eps: f64,
    /// Default spread factor between nominal and min/max sampling period.
    pub sampling_multiplier: u8,

    // Raw-data bounds
    /// Maximum accepted gap between consecutive samples, microseconds.
    pub max_sampling_us: u32,
    /// Minimum accepted gap between consecutive samples, microseconds.
    pub min_sampling_us: u32,
    /// Maximum super-cell voltage, 100 µV units.
    pub max_voltage: u32,
    /// Minimum super-cell voltage, 100 µV units.
    pub min_voltage: u32,
    /// Maximum cell current (1C), 100 µA units.
    pub max_cell_current: u32,

    // Topology
    /// Cells in parallel per super-cell.
    pub cells_parallel: u32,
    /// Voltage-measurement units in series behind one reading.
    pub cells_series: u32,

    // Endpoint averaging
    /// Search span to the left of the first JUMP for point A.
    pub point_a_left: u16,
    /// Search span to the right of the slope group for point D.
    pub point_d_right: u16,
    /// Samples averaged into each endpoint.
    pub point_count: u8,

    // Detection thresholds
    /// Maximum samples examined per TP candidate.
    pub tp_len_max: u32,
    /// Voltage derivative at or above which a sample is a JUMP, V/s.
    pub jump_der_v: f64,
    /// Current derivative at or above which a sample is a JUMP, A/s.
    pub jump_der_i: f64,
    /// Voltage derivative below which a sample is QCC, V/s.
    pub qcc_der_v: f64,
    /// Current derivative below which a sample is QCC, A/s.
    pub qcc_der_i: f64,
    /// Minimum R² of the QCC averaging window.
    pub qcc_r2_min: f64,
    /// Length of the quiet window required before a jump.
    pub qcc_len: u32,
    /// Voltage derivative at or above which a sample is a SLOPE, V/s.
    pub slope_der_v: f64,
    /// Current derivative at or above which a sample is a SLOPE, A/s.
    pub slope_der_i: f64,
    /// Minimum R² for the slope-phase linear fit to yield a parameter.
    pub slope_r2_min: f64,
    /// Minimum slope-group length.
    pub slope_len_min: u32,
    /// Voltage derivative below which a sample is TAIL, V/s.
    pub tail_der_v: f64,
    /// Current derivative below which a sample is TAIL, A/s.
    pub tail_der_i: f64,
    /// Minimum R² of the tail averaging window.
    pub tail_r2_min: f64,
    /// Tail length at which the counting pass stops.
    pub tail_len_min: u32,
    /// Minimum R² for a hyperbolic fit to be adopted.
    pub fit_r2_min: f64,

    /// Per-parameter rank thresholds; zero disables a slot.
    pub sos_thresholds: [f64; 8],
    /// Mark completed TPs of this session as baseline measurements.
    pub record_as_baseline: bool,

    /// Grammar strictness.
    pub flags: PolicyFlags,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            avg_sampling_us: 20_000,
            cell_capacity_mah: 2_850,
            initial_soc_tenths: 1_000,
            zero_eps: 1.0e-30,
            sampling_multiplier: 3,

            max_sampling_us: 100_000,
            min_sampling_us: 20_000,
            max_voltage: 44_000,
            min_voltage: 25_000,
            max_cell_current: 50_000,

            cells_parallel: 20,
            cells_series: 1,

            point_a_left: 2,
            point_d_right: 2,
            point_count: 2,

            tp_len_max: (TP_MAX_SAMPLES - 1) as u32,
            jump_der_v: 1.8,
            jump_der_i: 200.0,
            qcc_der_v: 0.18,
            qcc_der_i: 2.0,
            qcc_r2_min: 0.60,
            qcc_len: 3,
            slope_der_v: 0.1,
            slope_der_i: 30.0,
            slope_r2_min: 0.60,
            slope_len_min: 2,
            tail_der_v: 0.18,
            tail_der_i: 2.0,
            tail_r2_min: 0.60,
            tail_len_min: 5,
            fit_r2_min: 0.10,

            sos_thresholds: [0.015, 0.001, 100.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            record_as_baseline: false,

            flags: PolicyFlags::default(),
        }
    }
}

impl Config {
    /// Maximum voltage of one reading, 100 µV units.
    pub fn max_voltage_pack(&self) -> u32 {
        self.max_voltage * self.cells_series
    }

    /// Minimum voltage of one reading, 100 µV units.
    pub fn min_voltage_pack(&self) -> u32 {
        self.min_voltage * self.cells_series
    }

    /// Maximum module current, 100 µA units.
    pub fn max_current_pack(&self) -> u32 {
        self.max_cell_current * self.cells_parallel
    }

    /// Current magnitude below which an endpoint counts as open circuit
    /// (0.1C of one cell), 100 µA units.
    pub fn open_circuit_current(&self) -> u32 {
        // mAh * 10 (to 100 µA) / 10 (0.1C) cancels out.
        self.cell_capacity_mah
    }

    /// Nominal capacity behind one current reading, ampere-hours.
    pub fn nominal_capacity_ah(&self) -> f64 {
        1.0e-3 * self.cell_capacity_mah as f64 * (self.cells_parallel * self.cells_series) as f64
    }

    /// Accumulated charge corresponding to the configured initial SoC,
    /// ampere-hours.
    pub fn initial_charge_ah(&self) -> f64 {
        1.0e-3 * self.initial_soc_tenths as f64 * self.nominal_capacity_ah()
    }

    /// Number of rank-threshold slots actually consulted.
    pub fn active_thresholds(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.sos_thresholds
            .iter()
            .take(TP_PARAMS)
            .copied()
            .enumerate()
            .filter(|&(_, t)| t > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_pack_limits() {
        let c = Config::default();
        assert_eq!(c.max_voltage_pack(), 44_000);
        assert_eq!(c.min_voltage_pack(), 25_000);
        assert_eq!(c.max_current_pack(), 1_000_000); // 100 A in 100 µA units
        assert_eq!(c.open_circuit_current(), 2_850);
    }

    #[test]
    fn nominal_capacity_and_initial_charge() {
        let c = Config::default();
        assert!((c.nominal_capacity_ah() - 57.0).abs() < 1e-9);
        // 100% SoC at session start.
        assert!((c.initial_charge_ah() - 57.0).abs() < 1e-9);
    }

    #[test]
    fn only_defined_thresholds_are_active() {
        let c = Config::default();
        let active: Vec<_> = c.active_thresholds().collect();
        assert_eq!(active, vec![(0, 0.015), (1, 0.001), (2, 100.0)]);
    }
}
