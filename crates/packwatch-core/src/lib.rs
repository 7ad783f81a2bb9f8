//! Core data model for the Packwatch battery State-of-Safety estimator.
//!
//! This crate defines the pack topology constants, the raw sample and its
//! classification bitmask, the immutable runtime configuration, the fixed
//! sample ring the detection pipeline scans over, and the diagnostics ring
//! that absorbs pipeline faults without aborting it.

pub mod config;
pub mod diag;
pub mod ring;
pub mod sample;
pub mod storage;

pub use config::{Config, PolicyFlags};
pub use diag::{DiagKind, Diagnostic, DiagnosticCode, DiagnosticLog, Severity};
pub use ring::SampleRing;
pub use sample::{ClassMask, RawSample};
pub use storage::{FlashStorage, StorageError};

/// Cells wired in parallel forming one super-cell.
pub const CELLS_PER_SUPER: usize = 20;

/// Super-cells wired in series forming one module (one slave controller).
pub const SUPERS_PER_MODULE: usize = 12;

/// Modules wired in series forming the pack (one master controller).
pub const MODULES_PER_PACK: usize = 16;

/// Temperature sensors per module; read each tick, unused by the pipeline.
pub const TEMP_SENSORS: usize = 8;

/// Capacity of the sample ring. Must stay a power of two: slot selection
/// uses the low bits of the running sample counter.
pub const RING_LEN: usize = 128;

/// Maximum number of samples held by one Transition Period entry.
pub const TP_MAX_SAMPLES: usize = 30;

/// Number of derived physical parameters per super-cell.
pub const TP_PARAMS: usize = 5;

/// Bytes per non-volatile storage transfer.
pub const FLASH_PAGE: usize = 256;

const _: () = assert!(RING_LEN.is_power_of_two());
