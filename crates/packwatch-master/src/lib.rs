//! Master-controller facade.
//!
//! The master is a bookkeeper: every slave reports its 12 per-super-cell
//! verdicts over the bus in two 6-byte chunks, and the master files them
//! into a pack-wide rank table, persisted headerless at storage offset 0.

use packwatch_core::{
    DiagnosticCode, DiagnosticLog, FlashStorage, MODULES_PER_PACK, SUPERS_PER_MODULE,
};
use thiserror::Error;

/// Rank bytes carried per bus report.
pub const REPORT_CHUNK: usize = 6;

/// Size of the pack-wide rank table.
pub const SOS_TABLE_BYTES: usize = MODULES_PER_PACK * SUPERS_PER_MODULE;

/// Setup-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SetupError {
    /// The interface was already provided and not yet released.
    #[error("interface already configured")]
    AlreadyConfigured,
}

/// Initialise-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    /// No interface configured, or the module is already running.
    #[error("storage interface not configured")]
    Interface,
}

/// Everything the master needs from its host.
pub struct MasterInterface {
    pub storage: Box<dyn FlashStorage>,
    /// Identifier used for pack-level reports towards the vehicle.
    pub bus_control_id: u32,
}

impl MasterInterface {
    pub fn new(storage: Box<dyn FlashStorage>, bus_control_id: u32) -> Self {
        MasterInterface {
            storage,
            bus_control_id,
        }
    }
}

/// The pack-wide aggregator.
pub struct Master {
    interface: Option<MasterInterface>,
    running: bool,
    table: [u8; SOS_TABLE_BYTES],
    diag: DiagnosticLog,
}

impl Master {
    pub fn new() -> Self {
        Master {
            interface: None,
            running: false,
            table: [0; SOS_TABLE_BYTES],
            diag: DiagnosticLog::new(),
        }
    }

    /// Record the host interface. Must be the first call of a lifecycle.
    pub fn setup_interface(&mut self, interface: MasterInterface) -> Result<(), SetupError> {
        if self.interface.is_some() {
            return Err(SetupError::AlreadyConfigured);
        }
        self.interface = Some(interface);
        Ok(())
    }

    /// Load the persisted rank table and start accepting reports.
    pub fn initialise(&mut self) -> Result<(), InitError> {
        if self.running {
            return Err(InitError::Interface);
        }
        let interface = self.interface.as_mut().ok_or(InitError::Interface)?;

        let mut table = [0u8; SOS_TABLE_BYTES];
        match interface.storage.flash_read(0, &mut table) {
            Ok(()) => self.table = table,
            Err(_) => {
                self.diag.record(DiagnosticCode::Storage, "master", 0);
                log::warn!("rank table load failed; starting blank");
            }
        }
        self.running = true;
        Ok(())
    }

    /// Persist the rank table and release the interface.
    pub fn terminate(&mut self) {
        let Some(mut interface) = self.interface.take() else {
            return;
        };
        if self.running && interface.storage.flash_write(&self.table).is_err() {
            log::warn!("rank table commit failed");
        }
        self.running = false;
    }

    /// File one slave report.
    ///
    /// Message shape: `[module, chunk, rank × up-to-6]`, 3 to 8 bytes.
    /// Reserved rank values (≥ 4) are normalised to UNKNOWN on ingest;
    /// malformed or out-of-range reports are dropped with a diagnostic.
    pub fn on_bus_report(&mut self, report: &[u8]) {
        if !self.running {
            self.diag.record(DiagnosticCode::CallOrder, "master", 0);
            return;
        }
        if report.len() < 3 || report.len() > 8 {
            self.diag.record(DiagnosticCode::BusMessage, "master", 0);
            return;
        }

        let module = report[0] as usize;
        let offset = report[1] as usize * REPORT_CHUNK;
        let ranks = &report[2..];
        let count = ranks.len().min(REPORT_CHUNK);

        if module >= MODULES_PER_PACK || offset + count > SUPERS_PER_MODULE {
            self.diag.record(DiagnosticCode::BusMessage, "master", 0);
            return;
        }

        let row = module * SUPERS_PER_MODULE + offset;
        for (i, &byte) in ranks[..count].iter().enumerate() {
            self.table[row + i] = if byte <= 3 { byte } else { 0 };
        }
    }

    /// The pack-wide rank table, one byte per super-cell, row per module.
    /// Safe to call at any time.
    pub fn sos(&self) -> &[u8; SOS_TABLE_BYTES] {
        &self.table
    }

    /// Reserved for future bus commands; currently a no-op.
    pub fn driver_action(&mut self, _action: u8) {}

    pub fn diagnostics(&self) -> &DiagnosticLog {
        &self.diag
    }
}

impl Default for Master {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use packwatch_core::StorageError;

    struct MemFlash {
        bytes: Rc<RefCell<Vec<u8>>>,
        write_pos: usize,
    }

    impl MemFlash {
        fn new(bytes: Rc<RefCell<Vec<u8>>>) -> Self {
            MemFlash {
                bytes,
                write_pos: 0,
            }
        }
    }

    impl FlashStorage for MemFlash {
        fn flash_read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), StorageError> {
            let bytes = self.bytes.borrow();
            let start = address as usize;
            for (i, b) in buf.iter_mut().enumerate() {
                *b = bytes.get(start + i).copied().unwrap_or(0);
            }
            Ok(())
        }

        fn flash_write(&mut self, data: &[u8]) -> Result<(), StorageError> {
            let mut bytes = self.bytes.borrow_mut();
            let end = self.write_pos + data.len();
            if bytes.len() < end {
                bytes.resize(end, 0);
            }
            bytes[self.write_pos..end].copy_from_slice(data);
            self.write_pos = end;
            Ok(())
        }
    }

    fn running_master(flash: Rc<RefCell<Vec<u8>>>) -> Master {
        let mut master = Master::new();
        master
            .setup_interface(MasterInterface::new(Box::new(MemFlash::new(flash)), 0x701))
            .unwrap();
        master.initialise().unwrap();
        master
    }

    #[test]
    fn reports_land_in_the_module_row() {
        let mut master = running_master(Rc::new(RefCell::new(Vec::new())));

        let low = [3u8, 0, 1, 2, 3, 0, 1, 2];
        let high = [3u8, 1, 3, 3, 0, 1, 2, 3];
        master.on_bus_report(&low);
        master.on_bus_report(&high);

        let sos = master.sos();
        for i in 0..REPORT_CHUNK {
            assert_eq!(sos[3 * SUPERS_PER_MODULE + i], low[2 + i]);
            assert_eq!(sos[3 * SUPERS_PER_MODULE + REPORT_CHUNK + i], high[2 + i]);
        }
        // Other modules stay untouched.
        assert!(sos[..3 * SUPERS_PER_MODULE].iter().all(|&b| b == 0));
        assert!(sos[4 * SUPERS_PER_MODULE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn short_reports_fill_partially() {
        let mut master = running_master(Rc::new(RefCell::new(Vec::new())));
        master.on_bus_report(&[0, 0, 3, 3]);
        let sos = master.sos();
        assert_eq!(&sos[..4], &[3, 3, 0, 0]);
    }

    #[test]
    fn reserved_ranks_normalise_to_unknown() {
        let mut master = running_master(Rc::new(RefCell::new(Vec::new())));
        master.on_bus_report(&[0, 0, 4, 200, 3, 1, 0, 0]);
        let sos = master.sos();
        assert_eq!(&sos[..6], &[0, 0, 3, 1, 0, 0]);
    }

    #[test]
    fn malformed_reports_are_dropped() {
        let mut master = running_master(Rc::new(RefCell::new(Vec::new())));
        master.on_bus_report(&[0, 0]); // too short
        master.on_bus_report(&[16, 0, 1, 1, 1, 1, 1, 1]); // module out of range
        master.on_bus_report(&[0, 2, 1, 1, 1, 1, 1, 1]); // chunk past the row
        assert!(master.sos().iter().all(|&b| b == 0));
        assert!(master.diagnostics().contains(DiagnosticCode::BusMessage));
    }

    #[test]
    fn reports_before_initialise_are_rejected() {
        let mut master = Master::new();
        master.on_bus_report(&[0, 0, 1, 1, 1, 1, 1, 1]);
        assert!(master.diagnostics().contains(DiagnosticCode::CallOrder));
        assert!(master.sos().iter().all(|&b| b == 0));
    }

    #[test]
    fn table_round_trips_through_storage() {
        let flash = Rc::new(RefCell::new(Vec::new()));

        let mut master = running_master(flash.clone());
        master.on_bus_report(&[5, 0, 1, 2, 3, 1, 2, 3]);
        let before = *master.sos();
        master.terminate();

        let mut revived = running_master(flash);
        assert_eq!(*revived.sos(), before);
        // The table persists headerless at offset 0.
        revived.terminate();
    }
}
