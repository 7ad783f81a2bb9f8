//! Host-provided driver capabilities.

use packwatch_core::{FlashStorage, SUPERS_PER_MODULE, TEMP_SENSORS};

/// Measurement and storage capabilities the host must provide.
///
/// All methods may be called at any time after setup. Measurement reads of
/// one trigger refer to the same synchronized acquisition.
pub trait BatteryDriver: FlashStorage {
    /// Milliseconds since reset; monotone.
    fn timestamp_ms(&mut self) -> u32;

    /// Per-super-cell voltages, 100 µV units.
    fn cell_voltages(&mut self) -> [u16; SUPERS_PER_MODULE];

    /// Module current, 100 µA units; positive = charge.
    fn module_current(&mut self) -> i32;

    /// Module temperatures, centi-Kelvin. Read each tick for future use.
    fn temperatures(&mut self) -> [u16; TEMP_SENSORS];
}

/// Hardware identity collaborator consulted once at initialise.
pub trait IdentityCheck {
    fn verify(&mut self) -> bool;
}

/// Identity check that accepts every controller.
pub struct AcceptAll;

impl IdentityCheck for AcceptAll {
    fn verify(&mut self) -> bool {
        true
    }
}

/// Everything the slave needs from its host.
pub struct SlaveInterface {
    pub driver: Box<dyn BatteryDriver>,
    pub identity: Box<dyn IdentityCheck>,
    /// Identifier used for reports on the inter-controller bus.
    pub bus_control_id: u32,
}

impl SlaveInterface {
    /// Interface with the default identity check.
    pub fn new(driver: Box<dyn BatteryDriver>, bus_control_id: u32) -> Self {
        SlaveInterface {
            driver,
            identity: Box::new(AcceptAll),
            bus_control_id,
        }
    }

    pub fn with_identity(mut self, identity: Box<dyn IdentityCheck>) -> Self {
        self.identity = identity;
        self
    }
}
