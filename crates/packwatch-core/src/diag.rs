//! Coded diagnostics.
//!
//! The pipeline is realtime: samples keep arriving and nothing is retried,
//! so faults inside it are recorded rather than raised. Diagnostics land in
//! a fixed overwrite ring; severity is advisory and never stops processing.

/// Capacity of the diagnostics ring.
pub const DIAG_RING_LEN: usize = 100;

/// Everything the pipeline can complain about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticCode {
    // Interface misuse
    /// An API call arrived in the wrong lifecycle state.
    CallOrder,
    /// The hardware identity check rejected this controller.
    IdentityRejected,

    // Raw-data validation
    /// Gap to the previous sample outside the sampling window.
    TimeBreak,
    /// A super-cell voltage reading out of range; sample dropped.
    VoltageOutOfRange,
    /// Module current reading out of range; sample dropped.
    CurrentOutOfRange,

    // TP grammar
    /// Jump samples in opposing directions.
    JumpDirectionConflict,
    /// Jump sample inside the tail group.
    JumpInTail,
    /// Slope sample inside the jump group.
    SlopeInJump,
    /// Slope sample inside the tail group.
    SlopeInTail,
    /// Slope sample opposing the jump direction.
    SlopeDirectionConflict,
    /// Slope group required but empty.
    SlopeMissing,
    /// Voltage and current jump groups cannot be aligned.
    CannotAlign,

    // Characterisation
    /// Endpoint A or D could not be averaged.
    PointAd,
    /// Neither endpoint of the TP is at open circuit.
    PointsAdNotOc,
    /// Super-cell shows no voltage transition across the TP; skipped.
    NoCellTransition,
    /// Voltage 3-parameter fit rejected; fallback t₀ used.
    ApproxV3,
    /// Voltage 2-parameter fit rejected.
    ApproxV2,
    /// Current 3-parameter fit rejected; fallback t₀ used.
    ApproxI3,
    /// Current 2-parameter fit rejected.
    ApproxI2,
    /// Slope-phase regression rejected or out of polarity.
    SlopeRegression,
    /// A kernel was invoked with an unusable range.
    WrongInput,
    /// A parameter was absent when the ranker consulted it.
    NoParameter,

    // Storage / bus
    /// Non-volatile storage transfer failed.
    Storage,
    /// Malformed or out-of-range bus report.
    BusMessage,
}

/// Coarse category of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagKind {
    Interface,
    Identity,
    RawData,
    Grammar,
    Numeric,
    Parameter,
    Storage,
    Bus,
}

/// Advisory weight. The pipeline never aborts on either.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Advisory,
    Fault,
}

impl DiagnosticCode {
    pub fn kind(self) -> DiagKind {
        use DiagnosticCode::*;
        match self {
            CallOrder => DiagKind::Interface,
            IdentityRejected => DiagKind::Identity,
            TimeBreak | VoltageOutOfRange | CurrentOutOfRange => DiagKind::RawData,
            JumpDirectionConflict | JumpInTail | SlopeInJump | SlopeInTail
            | SlopeDirectionConflict | SlopeMissing | CannotAlign => DiagKind::Grammar,
            PointAd | PointsAdNotOc | ApproxV3 | ApproxV2 | ApproxI3 | ApproxI2
            | SlopeRegression | WrongInput => DiagKind::Numeric,
            NoCellTransition | NoParameter => DiagKind::Parameter,
            Storage => DiagKind::Storage,
            BusMessage => DiagKind::Bus,
        }
    }

    pub fn text(self) -> &'static str {
        use DiagnosticCode::*;
        match self {
            CallOrder => "wrong sequence of calls",
            IdentityRejected => "hardware identity check failed",
            TimeBreak => "time break between samples",
            VoltageOutOfRange => "voltage value is out of range",
            CurrentOutOfRange => "current value is out of range",
            JumpDirectionConflict => "jump samples in different directions",
            JumpInTail => "jump sample in the tail period",
            SlopeInJump => "slope sample in the jump period",
            SlopeInTail => "slope sample in the tail period",
            SlopeDirectionConflict => "slope samples in different directions",
            SlopeMissing => "slope period is empty",
            CannotAlign => "cannot align jump groups",
            PointAd => "no point A or D for the transition period",
            PointsAdNotOc => "neither endpoint is at open circuit",
            NoCellTransition => "super-cell shows no transition",
            ApproxV3 => "voltage 3-parameter approximation failed",
            ApproxV2 => "voltage 2-parameter approximation failed",
            ApproxI3 => "current 3-parameter approximation failed",
            ApproxI2 => "current 2-parameter approximation failed",
            SlopeRegression => "slope regression rejected",
            WrongInput => "wrong input parameters in a kernel",
            NoParameter => "parameter absent for ranking",
            Storage => "non-volatile storage transfer failed",
            BusMessage => "illegal bus report",
        }
    }
}

/// One recorded fault.
#[derive(Clone, Copy, Debug)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    /// Module that recorded it.
    pub source: &'static str,
    /// Timestamp of the sample being processed, if any.
    pub time_us: u64,
    pub message: &'static str,
}

/// Fixed overwrite ring of the last [`DIAG_RING_LEN`] diagnostics.
pub struct DiagnosticLog {
    entries: [Option<Diagnostic>; DIAG_RING_LEN],
    next: usize,
    total: u64,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        DiagnosticLog {
            entries: [None; DIAG_RING_LEN],
            next: 0,
            total: 0,
        }
    }

    /// Record an advisory diagnostic.
    pub fn record(&mut self, code: DiagnosticCode, source: &'static str, time_us: u64) {
        self.push(Diagnostic {
            code,
            severity: Severity::Advisory,
            source,
            time_us,
            message: code.text(),
        });
    }

    /// Record a diagnostic with explicit severity.
    pub fn record_severe(&mut self, code: DiagnosticCode, source: &'static str, time_us: u64) {
        self.push(Diagnostic {
            code,
            severity: Severity::Fault,
            source,
            time_us,
            message: code.text(),
        });
    }

    fn push(&mut self, diag: Diagnostic) {
        log::debug!(
            "diagnostic {:?} from {} at t={}µs: {}",
            diag.code,
            diag.source,
            diag.time_us,
            diag.message
        );
        self.entries[self.next] = Some(diag);
        self.next = (self.next + 1) % DIAG_RING_LEN;
        self.total += 1;
    }

    /// All retained diagnostics, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        let (tail, head) = self.entries.split_at(self.next);
        head.iter().chain(tail.iter()).filter_map(Option::as_ref)
    }

    pub fn contains(&self, code: DiagnosticCode) -> bool {
        self.iter().any(|d| d.code == code)
    }

    /// Total recorded since creation, including overwritten entries.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn clear(&mut self) {
        self.entries = [None; DIAG_RING_LEN];
        self.next = 0;
        self.total = 0;
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_finds_codes() {
        let mut log = DiagnosticLog::new();
        log.record(DiagnosticCode::TimeBreak, "test", 42);
        assert!(log.contains(DiagnosticCode::TimeBreak));
        assert!(!log.contains(DiagnosticCode::Storage));
        assert_eq!(log.total(), 1);
        let d = log.iter().next().unwrap();
        assert_eq!(d.time_us, 42);
        assert_eq!(d.code.kind(), DiagKind::RawData);
    }

    #[test]
    fn ring_overwrites_oldest() {
        let mut log = DiagnosticLog::new();
        for i in 0..(DIAG_RING_LEN as u64 + 10) {
            log.record(DiagnosticCode::WrongInput, "test", i);
        }
        assert_eq!(log.total(), DIAG_RING_LEN as u64 + 10);
        let times: Vec<u64> = log.iter().map(|d| d.time_us).collect();
        assert_eq!(times.len(), DIAG_RING_LEN);
        // Oldest surviving entry is number 10.
        assert_eq!(times[0], 10);
        assert_eq!(*times.last().unwrap(), DIAG_RING_LEN as u64 + 9);
    }

    #[test]
    fn kinds_cover_categories() {
        assert_eq!(DiagnosticCode::CallOrder.kind(), DiagKind::Interface);
        assert_eq!(DiagnosticCode::CannotAlign.kind(), DiagKind::Grammar);
        assert_eq!(DiagnosticCode::ApproxV3.kind(), DiagKind::Numeric);
        assert_eq!(DiagnosticCode::BusMessage.kind(), DiagKind::Bus);
    }
}
