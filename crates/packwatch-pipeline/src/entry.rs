//! The in-flight Transition Period entry.

use packwatch_core::{RawSample, SUPERS_PER_MODULE, TP_MAX_SAMPLES};

/// Group counts of one channel of a Transition Period.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupCounts {
    /// Quiet samples before the first jump.
    pub qcc: u8,
    /// Jump samples (including folded-in slopes).
    pub jump: u8,
    /// Slope samples between jump and tail.
    pub slope: u8,
    /// Tail samples after the slope.
    pub tail: u8,
}

impl GroupCounts {
    pub fn total(&self) -> u8 {
        self.qcc + self.jump + self.slope + self.tail
    }

    /// Samples up to and including the jump group.
    pub fn lead(&self) -> u8 {
        self.qcc + self.jump
    }
}

/// What kind of current step the TP straddles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TpShape {
    #[default]
    Unknown,
    /// Open circuit into a discharge step.
    OcToDrop,
    /// Open circuit into a charge step.
    OcToRise,
    /// Charge step back to open circuit.
    DropToOc,
    /// Discharge step back to open circuit.
    RiseToOc,
}

impl TpShape {
    /// True for the shapes whose voltage falls across the TP.
    pub fn is_drop(self) -> bool {
        matches!(self, TpShape::OcToDrop | TpShape::DropToOc)
    }
}

/// An averaged endpoint of the TP (point A before the jump, point D after
/// the slope). Voltages are averaged for every super-cell at once.
#[derive(Clone, Copy, Debug, Default)]
pub struct EndPoint {
    pub time_us: f64,
    pub voltages: [f64; SUPERS_PER_MODULE],
    pub current: f64,
    /// Origin-referenced R² of the averaged current window; diagnostic only.
    pub current_r2: f64,
}

/// The single in-flight Transition Period.
///
/// Overwritten in place on every detection attempt. `samples` holds the
/// copied window with timestamps rebased to zero; the first jump sits at
/// index `min(v.qcc, i.qcc)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TpEntry {
    /// Total samples in the TP window.
    pub total: u8,
    /// Voltage-channel group counts.
    pub v: GroupCounts,
    /// Current-channel group counts.
    pub i: GroupCounts,
    pub shape: TpShape,
    pub completed: bool,
    pub baseline: bool,
    /// Session-wide index of this TP.
    pub index: i16,
    /// Absolute time of the first window sample, microseconds.
    pub start_time_us: u64,
    /// State of charge at the TP, fraction of nominal capacity.
    pub soc: f64,
    pub point_a: EndPoint,
    pub point_d: EndPoint,
    pub samples: [RawSample; TP_MAX_SAMPLES],
}

impl TpEntry {
    /// Clear the entry for the next detection attempt.
    pub fn reset(&mut self) {
        *self = TpEntry::default();
    }

    /// The populated part of the sample window.
    pub fn window(&self) -> &[RawSample] {
        &self.samples[..self.total as usize]
    }
}
