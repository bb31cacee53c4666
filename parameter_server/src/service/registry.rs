use std::{collections::HashMap, sync::Arc};

use comms::specs::store::{ResourceHints, StoreSpec};
use log::{debug, warn};
use parking_lot::Mutex;

use super::StoreBuilder;
use crate::{error::ConstructionErr, storage::StoreHandle};

/// Running stores addressable by their logical name.
///
/// Looking a name up either returns the store that already runs under it or builds a
/// new one, there is never more than one live store per name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    builder: StoreBuilder,
    stores: Arc<Mutex<HashMap<String, StoreHandle>>>,
}

impl Registry {
    /// Creates a new empty `Registry`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the store named `spec.name`, building and starting it if no
    /// such store is running.
    ///
    /// Only the first caller's `spec` and `hints` are used, later callers get the running
    /// store as is.
    ///
    /// # Arguments
    /// * `spec` - The specification of the store.
    /// * `hints` - The placement hints for the store.
    ///
    /// # Returns
    /// A handle to the store or a `ConstructionErr` if it had to be built and couldn't be,
    /// in which case nothing gets registered.
    ///
    /// # Panics
    /// If called outside of a tokio runtime.
    pub fn get_or_create(
        &self,
        spec: &StoreSpec,
        hints: ResourceHints,
    ) -> Result<StoreHandle, ConstructionErr> {
        let mut stores = self.stores.lock();

        if let Some(handle) = stores.get(&spec.name) {
            if !handle.is_closed() {
                debug!(store = spec.name.as_str(); "reusing running store");
                return Ok(handle.clone());
            }

            warn!(store = spec.name.as_str(); "registered store stopped, starting a new one");
        }

        let handle = self.builder.build(spec, hints)?;
        stores.insert(spec.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Returns a handle to the running store named `name`, if any.
    pub fn get(&self, name: &str) -> Option<StoreHandle> {
        self.stores
            .lock()
            .get(name)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Forgets the store named `name`.
    ///
    /// The store keeps running for as long as someone else holds a handle to it.
    pub fn remove(&self, name: &str) -> Option<StoreHandle> {
        self.stores.lock().remove(name)
    }
}
