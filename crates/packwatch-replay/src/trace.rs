//! Replay traces: JSON input format and the built-in demonstration run.

use anyhow::{Context, Result, bail};
use packwatch_core::SUPERS_PER_MODULE;
use serde::{Deserialize, Serialize};

/// A recorded acquisition run.
///
/// Either `times_ms` gives explicit timestamps, or `step_ms` spaces the
/// samples evenly starting at one step (timestamp zero is reserved).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Sampling period in milliseconds, used when `times_ms` is absent.
    #[serde(default)]
    pub step_ms: Option<u32>,
    /// Explicit sample timestamps in milliseconds.
    #[serde(default)]
    pub times_ms: Option<Vec<u32>>,
    /// Per-sample super-cell voltages, 100 µV units.
    pub voltages: Vec<[u16; SUPERS_PER_MODULE]>,
    /// Per-sample module current, 100 µA units.
    pub currents: Vec<i32>,
}

impl Trace {
    pub fn len(&self) -> usize {
        self.voltages.len()
    }

    /// Validate the shape and materialise the timestamp vector.
    pub fn resolve_times(&self) -> Result<Vec<u32>> {
        if self.voltages.len() != self.currents.len() {
            bail!(
                "trace has {} voltage samples but {} current samples",
                self.voltages.len(),
                self.currents.len()
            );
        }
        if self.voltages.is_empty() {
            bail!("trace is empty");
        }
        match (&self.times_ms, self.step_ms) {
            (Some(times), _) => {
                if times.len() != self.voltages.len() {
                    bail!(
                        "trace has {} timestamps but {} samples",
                        times.len(),
                        self.voltages.len()
                    );
                }
                Ok(times.clone())
            }
            (None, Some(step)) if step > 0 => {
                Ok((0..self.voltages.len() as u32).map(|i| (i + 1) * step).collect())
            }
            _ => bail!("trace needs either times_ms or a positive step_ms"),
        }
    }

    pub fn from_json(text: &str) -> Result<Trace> {
        serde_json::from_str(text).context("failed to parse trace JSON")
    }
}

/// The demonstration run: 30 samples at 20 Hz. Super-cell 0 carries a
/// nominal load-on transition, super-cell 1 a degraded one, the remaining
/// super-cells stay quiet.
pub fn demo_trace() -> Trace {
    const CELL0: [u16; 30] = [
        41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 38_340,
        38_160, 38_020, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010,
        38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010,
    ];
    const CELL1: [u16; 30] = [
        41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 38_720,
        38_410, 38_090, 38_030, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010,
        38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010,
    ];
    const CURRENT: [i32; 30] = [
        -18_700, -18_700, -18_700, -18_700, -18_700, -18_700, -18_700, -18_700, -18_700, -18_700,
        -121_560, -212_100, -285_880, -285_880, -285_880, -285_880, -285_880, -285_880, -285_880,
        -285_880, -285_880, -285_880, -285_880, -285_880, -285_880, -285_880, -285_880, -285_880,
        -285_880, -285_880,
    ];

    let voltages = (0..30)
        .map(|i| {
            let mut row = [40_000u16; SUPERS_PER_MODULE];
            row[0] = CELL0[i];
            row[1] = CELL1[i];
            row
        })
        .collect();

    Trace {
        step_ms: Some(50),
        times_ms: None,
        voltages,
        currents: CURRENT.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_trace_is_well_formed() {
        let trace = demo_trace();
        let times = trace.resolve_times().unwrap();
        assert_eq!(times.len(), 30);
        assert_eq!(times[0], 50);
        assert_eq!(times[29], 1_500);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let mut trace = demo_trace();
        trace.currents.pop();
        assert!(trace.resolve_times().is_err());
    }

    #[test]
    fn json_round_trip() {
        let trace = demo_trace();
        let text = serde_json::to_string(&trace).unwrap();
        let back = Trace::from_json(&text).unwrap();
        assert_eq!(back.len(), trace.len());
        assert_eq!(back.voltages[10][0], 38_340);
    }
}
