//! In-memory enclave registry with create-on-first-use semantics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::enclave::Enclave;
use crate::kms::KeyService;
use crate::Result;

/// Segment every registry-created enclave is loaded with.
const DEFAULT_SEGMENT: &[u8] = b"init";

/// Owns named enclave instances for the process lifetime. No eviction.
///
/// The map itself is read-mostly; each entry carries its own mutex so
/// mutations to one enclave never serialize against another.
pub struct EnclaveRegistry {
    kms: Arc<KeyService>,
    instances: RwLock<HashMap<String, Arc<Mutex<Enclave>>>>,
}

impl EnclaveRegistry {
    pub fn new(kms: Arc<KeyService>) -> Self {
        Self {
            kms,
            instances: RwLock::new(HashMap::new()),
        }
    }

    /// Return the enclave registered under `name`, creating and loading it
    /// with the default segment on first use.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<Mutex<Enclave>>> {
        if let Some(enclave) = self.instances.read().unwrap().get(name) {
            return Ok(enclave.clone());
        }

        let mut instances = self.instances.write().unwrap();
        // Racing creators re-check under the write lock so only one instance
        // is ever registered per name.
        if let Some(enclave) = instances.get(name) {
            return Ok(enclave.clone());
        }

        let mut enclave = Enclave::new(name, self.kms.clone());
        enclave.load(&[DEFAULT_SEGMENT.to_vec()])?;
        let entry = Arc::new(Mutex::new(enclave));
        instances.insert(name.to_string(), entry.clone());
        tracing::info!("registered enclave '{}'", name);
        Ok(entry)
    }
}
