//! Slave-controller facade.
//!
//! Lifecycle:
//!
//! ```text
//! UNCONFIGURED --setup_interface--> CONFIGURED --initialise--> RUNNING
//!       ^                                                        |
//!       +------------------------- terminate -------------------+
//! ```
//!
//! While running, [`Slave::event_trigger`] is called once per acquisition
//! tick; it reads the driver, validates the sample and feeds the detection
//! pipeline. [`Slave::sos`] is readable at any time and returns all-UNKNOWN
//! until the first completed Transition Period.

pub mod driver;

use packwatch_core::{
    Config, DiagnosticCode, DiagnosticLog, RawSample, SUPERS_PER_MODULE,
    storage::{read_paged, write_paged},
};
use packwatch_pipeline::{HISTORY_BYTES, History, Session};
use thiserror::Error;

pub use driver::{AcceptAll, BatteryDriver, IdentityCheck, SlaveInterface};

/// Setup-time failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SetupError {
    /// The interface was already provided and not yet released.
    #[error("interface already configured")]
    AlreadyConfigured,
}

/// Initialise-time failure, reported to the host as a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitError {
    /// No interface configured, or the module is already running.
    #[error("driver interface not configured")]
    Interface,
    /// The hardware identity check rejected this controller.
    #[error("hardware identity check failed")]
    Identity,
}

impl InitError {
    /// The wire status code (0 is success).
    pub fn code(self) -> u8 {
        match self {
            InitError::Interface => 0x01,
            InitError::Identity => 0x02,
        }
    }
}

/// The slave estimator.
pub struct Slave {
    interface: Option<SlaveInterface>,
    session: Option<Session>,
    /// Last published verdicts, kept readable after terminate.
    sos_cache: [u8; SUPERS_PER_MODULE],
    /// Completed-TP count at the last terminate.
    tp_count_cache: i16,
}

impl Slave {
    pub fn new() -> Self {
        Slave {
            interface: None,
            session: None,
            sos_cache: [0; SUPERS_PER_MODULE],
            tp_count_cache: 0,
        }
    }

    /// Record the host interface. Must be the first call of a lifecycle.
    pub fn setup_interface(&mut self, interface: SlaveInterface) -> Result<(), SetupError> {
        if self.interface.is_some() {
            return Err(SetupError::AlreadyConfigured);
        }
        self.interface = Some(interface);
        Ok(())
    }

    /// Start a session with the default configuration.
    pub fn initialise(&mut self) -> Result<(), InitError> {
        self.initialise_with_config(Config::default())
    }

    /// Start a session: verify the hardware identity, reset all state and
    /// load the persisted history.
    pub fn initialise_with_config(&mut self, config: Config) -> Result<(), InitError> {
        if self.session.is_some() {
            return Err(InitError::Interface);
        }
        let interface = self.interface.as_mut().ok_or(InitError::Interface)?;
        if !interface.identity.verify() {
            return Err(InitError::Identity);
        }

        let mut session = Session::new(config);

        let mut image = vec![0u8; HISTORY_BYTES];
        match read_paged(&mut *interface.driver, &mut image) {
            Ok(()) => {
                if let Some(history) = History::from_bytes(&image) {
                    session.history = history;
                    session.restore_results();
                }
                // No magic tag means a blank part; start fresh.
            }
            Err(_) => {
                session.diag.record(DiagnosticCode::Storage, "slave", 0);
                log::warn!("history load failed; starting with empty history");
            }
        }

        self.sos_cache = *session.results.bytes();
        self.session = Some(session);
        Ok(())
    }

    /// Acquire and process one sample. Called once per ADC tick; silently a
    /// no-op outside the running state.
    pub fn event_trigger(&mut self) {
        let (Some(interface), Some(session)) = (self.interface.as_mut(), self.session.as_mut())
        else {
            return;
        };

        let time_ms = interface.driver.timestamp_ms();
        let current = interface.driver.module_current();
        let voltages = interface.driver.cell_voltages();
        let _ = interface.driver.temperatures();

        let sample = RawSample {
            time_us: time_ms as u64 * 1_000,
            current,
            voltages,
            ..RawSample::default()
        };
        session.ingest(sample);
    }

    /// Stop the session: flush any in-flight Transition Period, then commit
    /// the history. Releases the interface; the next call of a new
    /// lifecycle is `setup_interface`.
    pub fn terminate(&mut self) {
        let (Some(mut session), Some(mut interface)) = (self.session.take(), self.interface.take())
        else {
            return;
        };

        session.drain();

        if write_paged(&mut *interface.driver, session.history.as_bytes()).is_err() {
            log::warn!("history commit failed; latest results survive in memory only");
        }
        self.sos_cache = *session.results.bytes();
        self.tp_count_cache = session.tp_count;
    }

    /// The per-super-cell verdicts; safe to call at any time.
    pub fn sos(&self) -> &[u8; SUPERS_PER_MODULE] {
        match &self.session {
            Some(session) => session.results.bytes(),
            None => &self.sos_cache,
        }
    }

    /// Transition Periods completed so far (including past sessions of
    /// this process).
    pub fn completed_tps(&self) -> i16 {
        match &self.session {
            Some(session) => session.tp_count,
            None => self.tp_count_cache,
        }
    }

    /// Diagnostics of the running session, if any.
    pub fn diagnostics(&self) -> Option<&DiagnosticLog> {
        self.session.as_ref().map(|s| &s.diag)
    }

    /// The running session, for inspection by test benches and tooling.
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }
}

impl Default for Slave {
    fn default() -> Self {
        Self::new()
    }
}
