//! The set of drivers hosted by the agent, keyed by name.

use std::collections::BTreeMap;
use std::sync::Arc;

use fsrelay_core::Driver;
use tracing::{info, warn};

use crate::config::AgentConfig;

pub type DriverMap = BTreeMap<String, Arc<Driver>>;

/// Build one [`Driver`] per configured entry.
///
/// Drivers whose base path is not an existing directory are still hosted;
/// their operations fail with the native error until the path appears.
pub fn build_drivers(config: &AgentConfig) -> DriverMap {
    let mut drivers = DriverMap::new();
    for driver_config in &config.drivers {
        if !driver_config.path.is_dir() {
            warn!(
                "Base path of driver '{}' is not a directory: {}",
                driver_config.name,
                driver_config.path.display()
            );
        }
        let driver = Driver::new(driver_config.clone());
        drivers.insert(driver_config.name.clone(), Arc::new(driver));
    }
    info!("Hosting {} drivers", drivers.len());
    drivers
}

/// Close every open file on every driver.
pub async fn shutdown_drivers(drivers: &DriverMap) {
    for driver in drivers.values() {
        driver.shutdown().await;
    }
}
