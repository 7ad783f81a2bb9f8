//! State-of-Safety ranking.

use packwatch_core::{
    Config, DiagnosticCode, DiagnosticLog, SUPERS_PER_MODULE, TP_PARAMS,
};

/// Per-super-cell safety verdict. Wire values 0..=3; anything above is
/// reserved and reads back as [`SosRank::Unknown`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SosRank {
    /// Never computed.
    #[default]
    Unknown = 0,
    /// Within band of every consulted threshold.
    Normal = 1,
    /// Out of the normal band, inside the hazard band. Reserved on the
    /// ranking side; kept for bus compatibility.
    Attention = 2,
    /// Out of band; the super-cell should be removed.
    Critical = 3,
}

impl SosRank {
    pub fn from_byte(byte: u8) -> SosRank {
        match byte {
            1 => SosRank::Normal,
            2 => SosRank::Attention,
            3 => SosRank::Critical,
            _ => SosRank::Unknown,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Band-check the derived parameters of one super-cell.
///
/// Each defined threshold τ contributes NORMAL when τ/2 ≤ p ≤ 2τ and
/// CRITICAL otherwise; the verdict is the maximum contribution. A parameter
/// that was never computed contributes nothing beyond a diagnostic.
pub fn rank_parameters(
    config: &Config,
    params: &[Option<f64>; TP_PARAMS],
    diag: &mut DiagnosticLog,
    time_us: u64,
) -> SosRank {
    let mut rank = SosRank::Unknown;
    for (i, tau) in config.active_thresholds() {
        match params[i] {
            Some(p) => {
                let verdict = if tau / 2.0 <= p && p <= tau * 2.0 {
                    SosRank::Normal
                } else {
                    SosRank::Critical
                };
                rank = rank.max(verdict);
            }
            None => diag.record(DiagnosticCode::NoParameter, "rank", time_us),
        }
    }
    rank
}

/// The most recently published per-super-cell verdicts.
#[derive(Clone, Copy, Debug)]
pub struct LatestResults {
    /// Index of the TP the verdicts came from.
    pub index: i16,
    /// Absolute start time of that TP, microseconds.
    pub time_us: u64,
    /// One rank byte per super-cell.
    pub ranks: [u8; SUPERS_PER_MODULE],
}

impl LatestResults {
    pub fn new() -> Self {
        LatestResults {
            index: 0,
            time_us: 0,
            ranks: [SosRank::Unknown.as_byte(); SUPERS_PER_MODULE],
        }
    }

    /// Re-key the results for a new TP, clearing every verdict.
    pub fn reset_for(&mut self, index: i16, time_us: u64) {
        self.index = index;
        self.time_us = time_us;
        self.ranks = [SosRank::Unknown.as_byte(); SUPERS_PER_MODULE];
    }

    pub fn bytes(&self) -> &[u8; SUPERS_PER_MODULE] {
        &self.ranks
    }
}

impl Default for LatestResults {
    fn default() -> Self {
        Self::new()
    }
}
