//! Cross-power-cycle history of completed Transition Periods.
//!
//! The history keeps the first [`HIST_FIRST`] completed TPs as baseline
//! measurements plus a FIFO of the latest ones in the remaining slots. Its
//! storage image is a fixed 7,688-byte block: an 8-byte header (count +
//! magic tag) followed by one 64-byte record per (entry, super-cell). The
//! magic tag distinguishes initialised storage from a blank part.

use bytemuck::{Pod, Zeroable};
use packwatch_core::{SUPERS_PER_MODULE, TP_PARAMS};

use crate::characterize::CellAssessment;
use crate::entry::TpEntry;

/// Entries retained across power cycles.
pub const HIST_COUNT: usize = 10;

/// Leading entries that serve as the baseline.
pub const HIST_FIRST: usize = 3;

/// Size of the storage image in bytes.
pub const HISTORY_BYTES: usize =
    size_of::<HistoryHeader>() + size_of::<CellRecord>() * HIST_COUNT * SUPERS_PER_MODULE;

/// Tag identifying initialised storage, header bytes 1..=7.
pub const HISTORY_MAGIC: [u8; 7] = [0x29, 0xC8, 0x27, 0xC6, 0x25, 0xC4, 0x23];

/// One persisted (entry, super-cell) measurement. Exactly 64 bytes.
///
/// Parameters that were never computed are stored as NaN.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CellRecord {
    /// Absolute start time of the TP, microseconds.
    pub time_us: u64,
    /// State of charge at the TP.
    pub soc: f64,
    /// The five derived parameters; NaN where absent.
    pub params: [f64; TP_PARAMS],
    /// TP index within the session.
    pub index: i16,
    /// Super-cell index.
    pub cell: u8,
    /// Published rank byte.
    pub rank: u8,
    /// Non-zero for baseline measurements.
    pub baseline: u8,
    pub _pad: [u8; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct HistoryHeader {
    count: u8,
    magic: [u8; 7],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct HistoryImage {
    header: HistoryHeader,
    records: [[CellRecord; SUPERS_PER_MODULE]; HIST_COUNT],
}

const _: () = assert!(size_of::<CellRecord>() == 64);
const _: () = assert!(HISTORY_BYTES == 7_688);

/// In-memory history with its exact storage image.
pub struct History {
    image: HistoryImage,
}

impl History {
    pub fn new() -> Self {
        let mut image: HistoryImage = Zeroable::zeroed();
        image.header.magic = HISTORY_MAGIC;
        History { image }
    }

    /// Number of filled entries.
    pub fn len(&self) -> usize {
        (self.image.header.count as usize).min(HIST_COUNT)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a completed TP.
    ///
    /// The first [`HIST_FIRST`] completed TPs fill the baseline slots; once
    /// the history is full, the non-baseline slots shift to make room at
    /// the end.
    pub fn record_tp(
        &mut self,
        entry: &TpEntry,
        cells: &[Option<CellAssessment>; SUPERS_PER_MODULE],
        ranks: &[u8; SUPERS_PER_MODULE],
    ) {
        let slot = if (self.image.header.count as usize) < HIST_COUNT {
            let s = self.image.header.count as usize;
            self.image.header.count += 1;
            s
        } else {
            for i in HIST_FIRST..HIST_COUNT - 1 {
                self.image.records[i] = self.image.records[i + 1];
            }
            HIST_COUNT - 1
        };
        let baseline = slot < HIST_FIRST || entry.baseline;

        for (k, record) in self.image.records[slot].iter_mut().enumerate() {
            let mut params = [f64::NAN; TP_PARAMS];
            if let Some(cell) = &cells[k] {
                for (dst, src) in params.iter_mut().zip(cell.params.iter()) {
                    if let Some(p) = src {
                        *dst = *p;
                    }
                }
            }
            *record = CellRecord {
                time_us: entry.start_time_us,
                soc: entry.soc,
                params,
                index: entry.index,
                cell: k as u8,
                rank: ranks[k],
                baseline: baseline as u8,
                _pad: [0; 3],
            };
        }
    }

    /// Per-cell records of the most recently appended entry.
    pub fn latest(&self) -> Option<&[CellRecord; SUPERS_PER_MODULE]> {
        match self.len() {
            0 => None,
            c => Some(&self.image.records[c - 1]),
        }
    }

    /// The baseline entries recorded so far.
    pub fn baselines(&self) -> impl Iterator<Item = &[CellRecord; SUPERS_PER_MODULE]> {
        self.image.records[..self.len().min(HIST_FIRST)].iter()
    }

    /// The exact storage image.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.image)
    }

    /// Rebuild from a storage image. Returns `None` when the image is too
    /// short, carries no magic tag, or an impossible count.
    pub fn from_bytes(bytes: &[u8]) -> Option<History> {
        if bytes.len() < HISTORY_BYTES {
            return None;
        }
        let image: HistoryImage = bytemuck::pod_read_unaligned(&bytes[..HISTORY_BYTES]);
        if image.header.magic != HISTORY_MAGIC || image.header.count as usize > HIST_COUNT {
            return None;
        }
        Some(History { image })
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_with(index: i16, time_us: u64) -> TpEntry {
        TpEntry {
            index,
            start_time_us: time_us,
            soc: 0.5,
            completed: true,
            ..TpEntry::default()
        }
    }

    fn ranks_of(byte: u8) -> [u8; SUPERS_PER_MODULE] {
        [byte; SUPERS_PER_MODULE]
    }

    #[test]
    fn first_entries_become_baselines() {
        let mut h = History::new();
        let cells = [None; SUPERS_PER_MODULE];
        for i in 0..4 {
            h.record_tp(&entry_with(i, i as u64 * 100), &cells, &ranks_of(1));
        }
        assert_eq!(h.len(), 4);
        assert_eq!(h.baselines().count(), HIST_FIRST);
        for records in h.baselines() {
            assert_eq!(records[0].baseline, 1);
        }
        // The fourth entry is not a baseline.
        assert_eq!(h.latest().unwrap()[0].baseline, 0);
        assert_eq!(h.latest().unwrap()[0].index, 3);
    }

    #[test]
    fn fifo_shifts_once_full() {
        let mut h = History::new();
        let cells = [None; SUPERS_PER_MODULE];
        for i in 0..15 {
            h.record_tp(&entry_with(i, i as u64), &cells, &ranks_of(1));
        }
        assert_eq!(h.len(), HIST_COUNT);
        // Baselines are the first three TPs, untouched by the FIFO.
        let baseline_indices: Vec<i16> = h.baselines().map(|r| r[0].index).collect();
        assert_eq!(baseline_indices, vec![0, 1, 2]);
        // The newest entry always lands in the last slot.
        assert_eq!(h.latest().unwrap()[0].index, 14);
    }

    #[test]
    fn image_round_trips() {
        let mut h = History::new();
        let cells = [None; SUPERS_PER_MODULE];
        h.record_tp(&entry_with(7, 424_242), &cells, &ranks_of(3));

        let bytes = h.as_bytes().to_vec();
        assert_eq!(bytes.len(), HISTORY_BYTES);

        let restored = History::from_bytes(&bytes).expect("magic should match");
        assert_eq!(restored.len(), 1);
        let records = restored.latest().unwrap();
        assert_eq!(records[0].index, 7);
        assert_eq!(records[0].time_us, 424_242);
        assert_eq!(records[5].rank, 3);
        assert_eq!(records[5].cell, 5);
    }

    #[test]
    fn blank_storage_is_rejected() {
        let blank = vec![0u8; HISTORY_BYTES];
        assert!(History::from_bytes(&blank).is_none());
        assert!(History::from_bytes(&[]).is_none());
    }
}
