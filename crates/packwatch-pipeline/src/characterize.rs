//! Transition Period characterisation.
//!
//! Runs once per completed TP. The endpoints A (pre-jump) and D (post-slope)
//! are averaged over the ring for every super-cell at once, the sample
//! window is copied out with timestamps rebased to zero, and then each
//! super-cell is assessed independently: hyperbolic fits of the relaxation
//! curves, a linear fit of the slope phase, and the derived physical
//! parameters. A cell that fails a step is skipped; the TP itself survives.

use packwatch_core::{
    ClassMask, Config, DiagnosticCode, DiagnosticLog, SampleRing, SUPERS_PER_MODULE, TP_PARAMS,
};
use packwatch_numeric::{FitModel, average, fit_hyperbolic, fit_hyperbolic_optimal_t0,
    linear_regression};

use crate::entry::{EndPoint, TpEntry, TpShape};

/// Minimum span of samples fed to the hyperbolic fits.
const MIN_FIT_SPAN: usize = 6;

/// Endpoint swing below one raw quantisation step (100 µV) means the cell
/// never took part in the transition.
const MIN_CELL_SWING: f64 = 1.0;

/// Everything the characteriser derives for one super-cell.
#[derive(Clone, Copy, Debug, Default)]
pub struct CellAssessment {
    pub cell: usize,
    /// Singularity of the voltage fits, window-relative microseconds.
    pub v_t0: f64,
    /// Voltage 3-parameter coefficients (A, B, C), if adopted.
    pub v3: Option<[f64; 3]>,
    /// Voltage 2-parameter coefficients (A, C), if adopted.
    pub v2: Option<[f64; 2]>,
    /// Singularity of the current fits, window-relative microseconds.
    pub i_t0: f64,
    pub i3: Option<[f64; 3]>,
    pub i2: Option<[f64; 2]>,
    /// Slope-phase dV/dt, raw units per microsecond.
    pub slope_k: f64,
    /// Slope-phase intercept.
    pub slope_v0: f64,
    /// Point-B voltage: the slope line extrapolated to t₀.
    pub b_voltage: f64,
    /// Derived parameters: internal resistance, relaxation resistance,
    /// capacitance-like term, voltage curvature, current curvature.
    pub params: [Option<f64>; TP_PARAMS],
}

/// Characterise a completed TP.
///
/// Returns one assessment per super-cell; `None` for cells that were
/// skipped. Returns `None` outright when the endpoints cannot be averaged.
pub fn characterize(
    config: &Config,
    ring: &SampleRing,
    n: u64,
    charge_ah: f64,
    entry: &mut TpEntry,
    diag: &mut DiagnosticLog,
) -> Option<[Option<CellAssessment>; SUPERS_PER_MODULE]> {
    debug_assert!(entry.completed);
    let anchor_time = ring.at(n, 0).time_us;

    let point_a = match average_window(
        ring,
        n,
        -1,
        -(config.point_a_left as i64) - 1,
        config.point_count as i64,
        -1,
        config.zero_eps,
    ) {
        Some(p) => p,
        None => {
            diag.record(DiagnosticCode::PointAd, "characterize", anchor_time);
            return None;
        }
    };
    let past_slope = (entry.v.jump + entry.v.slope) as i64;
    let point_d = match average_window(
        ring,
        n,
        past_slope,
        past_slope + config.point_d_right as i64,
        config.point_count as i64,
        1,
        config.zero_eps,
    ) {
        Some(p) => p,
        None => {
            diag.record(DiagnosticCode::PointAd, "characterize", anchor_time);
            return None;
        }
    };
    entry.point_a = point_a;
    entry.point_d = point_d;
    entry.soc = charge_ah / config.nominal_capacity_ah();
    entry.baseline = config.record_as_baseline;

    copy_window(ring, n, entry);

    let oc_current = config.open_circuit_current() as f64;
    let mut cells: [Option<CellAssessment>; SUPERS_PER_MODULE] = [None; SUPERS_PER_MODULE];

    for k in 0..SUPERS_PER_MODULE {
        let va = point_a.voltages[k];
        let vd = point_d.voltages[k];
        let ia = point_a.current;
        let id = point_d.current;

        if (va - vd).abs() < MIN_CELL_SWING {
            diag.record(
                DiagnosticCode::NoCellTransition,
                "characterize",
                entry.start_time_us,
            );
            continue;
        }

        if config.flags.strong_tp_type && ia.abs() > oc_current && id.abs() > oc_current {
            diag.record(
                DiagnosticCode::PointsAdNotOc,
                "characterize",
                entry.start_time_us,
            );
            continue;
        }

        let a_mag = ia.abs().round();
        let d_mag = id.abs().round();
        let shape = if va > vd {
            if a_mag < d_mag {
                TpShape::OcToDrop
            } else {
                TpShape::DropToOc
            }
        } else if a_mag < d_mag {
            TpShape::OcToRise
        } else {
            TpShape::RiseToOc
        };
        entry.shape = shape;

        let mut cell = CellAssessment {
            cell: k,
            ..CellAssessment::default()
        };
        fit_cell_curves(config, entry, k, &mut cell, diag);
        derive_parameters(config, entry, k, shape, &mut cell, diag);
        cells[k] = Some(cell);
    }

    Some(cells)
}

/// Copy the TP window out of the ring and rebase its timestamps.
///
/// The first jump lands at index `min(v.qcc, i.qcc)` so both channels'
/// group counts index the same array.
fn copy_window(ring: &SampleRing, n: u64, entry: &mut TpEntry) {
    debug_assert!(ring.at(n, 0).class_union().intersects(ClassMask::JUMP));

    let shift = entry.v.qcc.min(entry.i.qcc) as i64;
    let count = entry.total as usize;
    for idx in 0..count {
        entry.samples[idx] = *ring.at(n, idx as i64 - shift);
    }

    let t0 = entry.samples[0].time_us;
    entry.start_time_us = t0;
    for sample in &mut entry.samples[..count] {
        sample.time_us -= t0;
    }
}

/// Average a run of ring samples into one endpoint.
///
/// The searched range runs from `off_from` towards `off_upto` (inclusive)
/// with `step` of ±1; of the samples available there, the `want` closest to
/// `off_from` are averaged. Returns `None` when the range is empty.
fn average_window(
    ring: &SampleRing,
    n: u64,
    off_from: i64,
    off_upto: i64,
    want: i64,
    step: i64,
    eps: f64,
) -> Option<EndPoint> {
    let stop = off_upto + step;
    let avail = (stop - off_from) * step;
    let count = avail.min(want);
    if count <= 0 {
        return None;
    }

    let mut point = EndPoint::default();
    let mut time_sum = 0.0;
    let mut currents = Vec::with_capacity(count as usize);
    let mut pos = stop - step;
    for _ in 0..count {
        pos -= step;
        let sample = ring.at(n, pos);
        time_sum += sample.time_us as f64;
        for k in 0..SUPERS_PER_MODULE {
            point.voltages[k] += sample.voltages[k] as f64;
        }
        currents.push(sample.current as f64);
    }

    let divisor = count as f64;
    point.time_us = time_sum / divisor;
    for v in &mut point.voltages {
        *v /= divisor;
    }
    point.current = currents.iter().sum::<f64>() / divisor;
    if let Ok(avg) = average(&currents, eps) {
        point.current_r2 = avg.r2;
    }
    Some(point)
}

/// Hyperbolic fits of the post-jump relaxation, voltage then current.
fn fit_cell_curves(
    config: &Config,
    entry: &TpEntry,
    k: usize,
    out: &mut CellAssessment,
    diag: &mut DiagnosticLog,
) {
    let window = entry.window();
    let eps = config.zero_eps;

    // Voltage.
    let i_start = entry.v.qcc as usize + 1;
    let i_end = ((entry.v.lead() + entry.v.slope) as usize).max(i_start + MIN_FIT_SPAN);
    let fallback = window[i_start.min(window.len() - 1)].time_us as f64;

    let range_ok = i_start >= 2
        && i_end <= window.len()
        && window[i_start - 1].vclass.intersects(ClassMask::JUMP)
        && !window[i_start - 2].vclass.intersects(ClassMask::JUMP);

    if range_ok {
        let times: Vec<f64> = window[i_start..i_end]
            .iter()
            .map(|s| s.time_us as f64)
            .collect();
        let volts: Vec<f64> = window[i_start..i_end]
            .iter()
            .map(|s| s.voltages[k] as f64)
            .collect();
        let t_before = window[i_start - 1].time_us as f64;

        let mut adopted = false;
        if let Ok(fit) = fit_hyperbolic_optimal_t0(t_before, &times, &volts, eps) {
            if fit.r2 >= config.fit_r2_min {
                out.v_t0 = fit.t0;
                out.v3 = Some([fit.a, fit.b, fit.c]);
                adopted = true;
            }
        }
        if !adopted {
            diag.record(DiagnosticCode::ApproxV3, "characterize", entry.start_time_us);
            out.v_t0 = fallback;
        }

        match fit_hyperbolic(&times, &volts, out.v_t0, FitModel::Two, eps) {
            Ok(fit) if fit.r2 >= config.fit_r2_min => {
                out.v2 = Some([fit.a, fit.c]);
                out.params[3] = Some(fit.a.abs() * 1.0e-12);
            }
            _ => diag.record(DiagnosticCode::ApproxV2, "characterize", entry.start_time_us),
        }
    } else {
        diag.record(DiagnosticCode::WrongInput, "characterize", entry.start_time_us);
        out.v_t0 = fallback;
    }

    // Current, only when the current channel actually jumped.
    if entry.i.jump == 0 {
        return;
    }
    let i_start = entry.i.qcc as usize + 1;
    let i_end = ((entry.i.lead() + entry.i.slope) as usize).max(i_start + MIN_FIT_SPAN);
    let fallback = window[i_start.min(window.len() - 1)].time_us as f64;

    let range_ok = i_start >= 2
        && i_end <= window.len()
        && window[i_start - 1].iclass.intersects(ClassMask::JUMP)
        && !window[i_start - 2].iclass.intersects(ClassMask::JUMP);

    if range_ok {
        let times: Vec<f64> = window[i_start..i_end]
            .iter()
            .map(|s| s.time_us as f64)
            .collect();
        let amps: Vec<f64> = window[i_start..i_end]
            .iter()
            .map(|s| s.current as f64)
            .collect();
        let t_before = window[i_start - 1].time_us as f64;

        let mut adopted = false;
        if let Ok(fit) = fit_hyperbolic_optimal_t0(t_before, &times, &amps, eps) {
            if fit.r2 >= config.fit_r2_min {
                out.i_t0 = fit.t0;
                out.i3 = Some([fit.a, fit.b, fit.c]);
                adopted = true;
            }
        }
        if !adopted {
            diag.record(DiagnosticCode::ApproxI3, "characterize", entry.start_time_us);
            out.i_t0 = fallback;
        }

        match fit_hyperbolic(&times, &amps, out.i_t0, FitModel::Two, eps) {
            Ok(fit) if fit.r2 >= config.fit_r2_min => {
                out.i2 = Some([fit.a, fit.c]);
                out.params[4] = Some(fit.a.abs() * 1.0e-15);
            }
            _ => diag.record(DiagnosticCode::ApproxI2, "characterize", entry.start_time_us),
        }
    } else {
        diag.record(DiagnosticCode::WrongInput, "characterize", entry.start_time_us);
        out.i_t0 = fallback;
    }
}

/// Slope-phase regression, point B and the derived resistances.
fn derive_parameters(
    config: &Config,
    entry: &TpEntry,
    k: usize,
    shape: TpShape,
    out: &mut CellAssessment,
    diag: &mut DiagnosticLog,
) {
    let window = entry.window();
    let eps = config.zero_eps;
    let drop = shape.is_drop();

    let i_start = entry.v.lead() as usize;
    let i_end = i_start + entry.v.slope as usize + 1;

    let mut accepted = None;
    if i_end <= window.len() && i_end - i_start >= 2 {
        let times: Vec<f64> = window[i_start..i_end]
            .iter()
            .map(|s| s.time_us as f64)
            .collect();
        let volts: Vec<f64> = window[i_start..i_end]
            .iter()
            .map(|s| s.voltages[k] as f64)
            .collect();
        if let Ok(lr) = linear_regression(&times, &volts, eps) {
            // The slope must agree with the TP polarity.
            if (drop && lr.slope <= -eps) || (!drop && lr.slope >= eps) {
                accepted = Some(lr);
            }
        }
    }

    let va = entry.point_a.voltages[k];
    let vd = entry.point_d.voltages[k];
    let ia = entry.point_a.current;
    let id = entry.point_d.current;

    match accepted {
        Some(lr) => {
            out.slope_k = lr.slope;
            out.slope_v0 = lr.intercept;
            out.b_voltage = lr.slope * out.v_t0 + lr.intercept;
            if lr.r2 >= config.slope_r2_min {
                // Capacitance-like: current swing over voltage slope.
                out.params[2] = Some((id - ia) / lr.slope * 1.0e-6);
            }
        }
        None => {
            diag.record(
                DiagnosticCode::SlopeRegression,
                "characterize",
                entry.start_time_us,
            );
            let lo = i_start.min(window.len());
            let hi = i_end.min(window.len());
            let mean = if hi > lo {
                window[lo..hi]
                    .iter()
                    .map(|s| s.voltages[k] as f64)
                    .sum::<f64>()
                    / (hi - lo) as f64
            } else {
                vd
            };
            out.slope_k = 0.0;
            out.slope_v0 = mean;
            out.b_voltage = mean;
        }
    }

    let swing = ia - id;
    if swing.abs() < eps {
        diag.record(DiagnosticCode::WrongInput, "characterize", entry.start_time_us);
        return;
    }
    // Ohmic resistance across the jump, relaxation resistance across the
    // slope, both against the same current swing.
    out.params[0] = Some((va - out.b_voltage) / swing);
    out.params[1] = Some((out.b_voltage - vd) / swing);
}
