use quarry_core::driver::DriverFactory;

use std::collections::HashMap;
use std::sync::Arc;

/// Startup-time map from driver name to connection factory.
///
/// Built once while the runtime is assembled; connection settings select a
/// factory by name at dispatch time. An unknown name is a configuration
/// defect, reported when the runtime is built.
#[derive(Default)]
pub struct DriverRegistry {
    factories: HashMap<&'static str, Arc<dyn DriverFactory>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: impl DriverFactory) -> &mut Self {
        self.factories.insert(factory.driver_name(), Arc::new(factory));
        self
    }

    pub fn get(&self, driver_name: &str) -> Option<&Arc<dyn DriverFactory>> {
        self.factories.get(driver_name)
    }

    pub fn contains(&self, driver_name: &str) -> bool {
        self.factories.contains_key(driver_name)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
