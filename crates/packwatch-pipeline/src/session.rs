//! Per-session pipeline state and the sample ingest path.
//!
//! Everything the estimator mutates between `initialise` and `terminate`
//! lives here: the ring, the counters, the accumulated charge, the
//! in-flight TP entry, the diagnostics ring, the published results and the
//! persisted history. The facade feeds validated driver readings in through
//! [`Session::ingest`] and drains the detector through [`Session::drain`]
//! at shutdown.

use packwatch_core::{
    ClassMask, Config, DiagnosticCode, DiagnosticLog, RawSample, SampleRing,
    ring::INSPECT_OFFSET,
};

use crate::characterize::characterize;
use crate::classify::{DerivativeStats, classify};
use crate::entry::TpEntry;
use crate::history::History;
use crate::rank::{LatestResults, SosRank, rank_parameters};
use crate::recognize::{Scan, scan, skip_advance};

/// Ampere-hours per (100 µA · µs): 1e-10 / 3600.
const CHARGE_SCALE: f64 = 2.777778e-14;

/// Virtual ticks the shutdown drain sweeps to flush an in-flight TP.
const DRAIN_TICKS: u64 = 10;

pub struct Session {
    pub config: Config,
    pub ring: SampleRing,
    /// Running count of accepted samples (plus drain ticks).
    pub n: u64,
    /// Detection debounce; the recogniser runs only when this is zero.
    pub skip: u64,
    /// Accumulated charge, ampere-hours.
    pub charge_ah: f64,
    pub charge_min_ah: f64,
    pub charge_max_ah: f64,
    pub stats: DerivativeStats,
    /// Completed TPs this session.
    pub tp_count: i16,
    pub entry: TpEntry,
    pub diag: DiagnosticLog,
    pub results: LatestResults,
    pub history: History,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let charge = config.initial_charge_ah();
        Session {
            config,
            ring: SampleRing::new(),
            n: 0,
            // Hold the detector off until the anchor reaches written slots.
            skip: INSPECT_OFFSET as u64,
            charge_ah: charge,
            charge_min_ah: 1.0e30,
            charge_max_ah: -1.0e30,
            stats: DerivativeStats::default(),
            tp_count: 0,
            entry: TpEntry::default(),
            diag: DiagnosticLog::new(),
            results: LatestResults::new(),
            history: History::new(),
        }
    }

    /// Fraction of nominal capacity currently stored.
    pub fn soc(&self) -> f64 {
        self.charge_ah / self.config.nominal_capacity_ah()
    }

    /// Validate and ingest one driver reading.
    ///
    /// Out-of-bounds samples are dropped with a diagnostic and never reach
    /// the ring. Returns whether the sample was accepted.
    pub fn ingest(&mut self, mut sample: RawSample) -> bool {
        if sample.current.unsigned_abs() > self.config.max_current_pack() {
            self.diag
                .record(DiagnosticCode::CurrentOutOfRange, "session", sample.time_us);
            return false;
        }
        for &v in &sample.voltages {
            if (v as u32) > self.config.max_voltage_pack()
                || (v as u32) < self.config.min_voltage_pack()
            {
                self.diag
                    .record(DiagnosticCode::VoltageOutOfRange, "session", sample.time_us);
                return false;
            }
        }

        if self.n == 0 {
            self.ring.write(0, sample);
            self.n = 1;
            return true;
        }

        let prev = *self.ring.last(self.n);

        // An out-of-window gap marks the newer sample; the TP recogniser
        // refuses any window that spans it.
        let broken = prev.time_us + self.config.min_sampling_us as u64 > sample.time_us
            || prev.time_us + (self.config.max_sampling_us as u64) < sample.time_us;
        if broken {
            sample.vclass |= ClassMask::TIME_BREAK;
            sample.iclass |= ClassMask::TIME_BREAK;
            self.diag
                .record(DiagnosticCode::TimeBreak, "session", sample.time_us);
        }

        // Retroactive classification of the previous sample, skipped when
        // either side of the derivative is unusable.
        if !broken && !prev.class_union().intersects(ClassMask::TIME_BREAK) {
            let (vclass, iclass) = classify(&self.config, &prev, &sample, &mut self.stats);
            let slot = self.ring.slot_mut(self.n - 1);
            slot.vclass |= vclass;
            slot.iclass |= iclass;
        }

        self.ring.write(self.n, sample);
        self.n += 1;

        // Trapezoidal charge integration.
        let dt_us = (sample.time_us - prev.time_us) as f64;
        let mid = ((prev.current as i64 + sample.current as i64) >> 1) as f64;
        self.charge_ah += CHARGE_SCALE * dt_us * mid;
        self.charge_max_ah = self.charge_max_ah.max(self.charge_ah);
        self.charge_min_ah = self.charge_min_ah.min(self.charge_ah);

        if self.skip > 0 {
            self.skip -= 1;
        } else {
            self.run_detector();
        }
        true
    }

    /// Flush any in-flight TP at shutdown: advance the inspection anchor
    /// through [`DRAIN_TICKS`] virtual ticks, running the recogniser on
    /// every one. The debounce counter is cleared per tick; no further
    /// samples arrive, so the sweep must not stop early on a candidate
    /// that was merely examined. The quiet-window pre-check still keeps a
    /// TP completed mid-sweep from being counted twice.
    pub fn drain(&mut self) {
        for _ in 0..DRAIN_TICKS {
            self.n += 1;
            self.skip = 0;
            self.run_detector();
        }
    }

    /// Restore the published results from the newest history entry.
    pub fn restore_results(&mut self) {
        if let Some(records) = self.history.latest() {
            self.results.reset_for(records[0].index, records[0].time_us);
            for (k, record) in records.iter().enumerate() {
                self.results.ranks[k] = SosRank::from_byte(record.rank).as_byte();
            }
            self.tp_count = records[0].index.saturating_add(1);
        }
    }

    fn run_detector(&mut self) {
        let outcome = scan(
            &self.config,
            &self.ring,
            self.n,
            &mut self.entry,
            &mut self.diag,
        );
        if outcome == Scan::Completed {
            self.process_completed_tp();
        }
        self.skip += skip_advance(&self.config, &self.entry, outcome);
    }

    fn process_completed_tp(&mut self) {
        self.entry.index = self.tp_count;
        self.tp_count += 1;

        let cells = characterize(
            &self.config,
            &self.ring,
            self.n,
            self.charge_ah,
            &mut self.entry,
            &mut self.diag,
        );

        self.results
            .reset_for(self.entry.index, self.entry.start_time_us);

        let Some(cells) = cells else {
            return;
        };

        for (k, cell) in cells.iter().enumerate() {
            if let Some(cell) = cell {
                let rank = rank_parameters(
                    &self.config,
                    &cell.params,
                    &mut self.diag,
                    self.entry.start_time_us,
                );
                self.results.ranks[k] = rank.as_byte();
            }
        }

        self.history.record_tp(&self.entry, &cells, &self.results.ranks);
        log::debug!(
            "TP {} at t={}µs completed: counts v={:?} i={:?}, ranks {:?}",
            self.entry.index,
            self.entry.start_time_us,
            self.entry.v,
            self.entry.i,
            self.results.ranks
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packwatch_core::SUPERS_PER_MODULE;

    fn sample(t_ms: u64, volts: [u16; SUPERS_PER_MODULE], current: i32) -> RawSample {
        RawSample {
            time_us: t_ms * 1_000,
            current,
            voltages: volts,
            ..RawSample::default()
        }
    }

    fn flat(v: u16) -> [u16; SUPERS_PER_MODULE] {
        [v; SUPERS_PER_MODULE]
    }

    #[test]
    fn out_of_bounds_samples_are_dropped() {
        let mut s = Session::new(Config::default());
        assert!(!s.ingest(sample(50, flat(50_000), -18_700)));
        assert!(s.diag.contains(DiagnosticCode::VoltageOutOfRange));
        assert!(!s.ingest(sample(50, flat(40_000), 2_000_000)));
        assert!(s.diag.contains(DiagnosticCode::CurrentOutOfRange));
        assert_eq!(s.n, 0);
    }

    #[test]
    fn gap_marks_time_break_on_the_newer_sample() {
        let mut s = Session::new(Config::default());
        assert!(s.ingest(sample(50, flat(40_000), -18_700)));
        assert!(s.ingest(sample(1_050, flat(40_000), -18_700)));
        assert!(s.diag.contains(DiagnosticCode::TimeBreak));
        assert!(
            s.ring
                .last(s.n)
                .class_union()
                .intersects(ClassMask::TIME_BREAK)
        );
    }

    #[test]
    fn classification_lags_one_sample() {
        let mut s = Session::new(Config::default());
        s.ingest(sample(50, flat(40_000), -18_700));
        // The first sample has no class until the second arrives.
        assert!(s.ring.slot(0).class_union().is_empty());
        s.ingest(sample(100, flat(40_000), -18_700));
        assert!(s.ring.slot(0).vclass.intersects(ClassMask::QCC));
        // The head sample is still unclassified.
        assert!(s.ring.slot(1).class_union().is_empty());
    }

    #[test]
    fn charge_integrates_discharge_current() {
        let mut s = Session::new(Config::default());
        let start = s.charge_ah;
        s.ingest(sample(50, flat(40_000), -18_700));
        s.ingest(sample(100, flat(40_000), -18_700));
        // 1.87 A for 50 ms is about 26 µAh.
        let delta = start - s.charge_ah;
        assert!(delta > 0.0, "discharge must reduce charge");
        assert!((delta - 1.87 * 0.05 / 3600.0).abs() < 1e-8);
        assert!(s.charge_max_ah >= s.charge_min_ah);
    }

    #[test]
    fn flat_trace_completes_no_tp() {
        let mut s = Session::new(Config::default());
        for i in 0..30 {
            s.ingest(sample((i + 1) * 50, flat(40_000), -18_700));
        }
        s.drain();
        assert_eq!(s.tp_count, 0);
        assert!(s.results.bytes().iter().all(|&b| b == 0));
    }

    /// Ten quiet samples, a jump on super-cell 0, slope, then tail; the
    /// other super-cells stay flat.
    fn feed_reference_transition(s: &mut Session) {
        let v0 = [
            41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120, 41_120,
            38_340, 38_160, 38_020, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010,
            38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010, 38_010,
        ];
        let cur = [
            -18_700, -18_700, -18_700, -18_700, -18_700, -18_700, -18_700, -18_700, -18_700,
            -18_700, -121_560, -212_100, -285_880, -285_880, -285_880, -285_880, -285_880,
            -285_880, -285_880, -285_880, -285_880, -285_880, -285_880, -285_880, -285_880,
            -285_880, -285_880, -285_880, -285_880, -285_880,
        ];
        for i in 0..30 {
            let mut volts = flat(40_000);
            volts[0] = v0[i];
            s.ingest(sample((i as u64 + 1) * 50, volts, cur[i]));
        }
    }

    #[test]
    fn single_cell_transition_is_detected_and_ranked() {
        let mut s = Session::new(Config::default());
        feed_reference_transition(&mut s);
        s.drain();

        assert_eq!(s.tp_count, 1);
        assert!(s.entry.completed);
        // Count identity holds on both channels.
        assert_eq!(s.entry.total, s.entry.v.total());
        assert_eq!(s.entry.total, s.entry.i.total());
        assert_eq!(s.results.ranks[0], SosRank::Normal.as_byte());
        for k in 1..SUPERS_PER_MODULE {
            assert_eq!(s.results.ranks[k], SosRank::Unknown.as_byte());
        }
        assert_eq!(s.history.len(), 1);
    }

    #[test]
    fn drain_sweeps_despite_pending_debounce() {
        let mut s = Session::new(Config::default());
        feed_reference_transition(&mut s);
        // A debounce left over at shutdown must not suppress the flush;
        // the jump is still sitting ahead of the inspection anchor.
        s.skip = 7;
        s.drain();
        assert_eq!(s.tp_count, 1);
        assert_eq!(s.results.ranks[0], SosRank::Normal.as_byte());
    }

    #[test]
    fn drain_does_not_count_a_transition_twice() {
        let mut s = Session::new(Config::default());
        feed_reference_transition(&mut s);
        // The sweep keeps running after the TP completes; with the jump
        // behind the anchor and the quiet-window pre-check in front of it,
        // the same TP must not be recognised again.
        s.drain();
        assert_eq!(s.tp_count, 1);
    }
}
