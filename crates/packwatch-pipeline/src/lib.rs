//! The Transition Period pipeline.
//!
//! Data flow per accepted sample: the previous ring sample is classified
//! against the new one ([`classify`]), the new sample is pushed and charge
//! integrated ([`session`]); unless the debounce counter says otherwise,
//! the recogniser then scans the inspection anchor for a completed
//! Transition Period ([`recognize`]). A completed TP is characterised per
//! super-cell ([`characterize`]), ranked ([`rank`]) and appended to the
//! persisted history ([`history`]).

pub mod characterize;
pub mod classify;
pub mod entry;
pub mod history;
pub mod rank;
pub mod recognize;
pub mod session;

pub use characterize::CellAssessment;
pub use classify::DerivativeStats;
pub use entry::{EndPoint, GroupCounts, TpEntry, TpShape};
pub use history::{CellRecord, HIST_COUNT, HIST_FIRST, HISTORY_BYTES, History};
pub use rank::{LatestResults, SosRank};
pub use session::Session;
