use std::sync::Arc;

use cclab_core::enclave::EnclaveRegistry;
use cclab_core::kms::KeyService;
use cclab_core::sev::VmLaunchManager;

/// Shared daemon state: one KMS handle borrowed by both the enclave
/// registry and the VM launch manager. All state is process-lifetime only;
/// a restart discards every enclave, VM, sealed secret, and cached key.
pub struct DaemonState {
    pub enclaves: EnclaveRegistry,
    pub vms: VmLaunchManager,
}

impl DaemonState {
    pub fn new() -> Self {
        let kms = Arc::new(KeyService::new());
        Self {
            enclaves: EnclaveRegistry::new(kms.clone()),
            vms: VmLaunchManager::new(kms),
        }
    }
}

impl Default for DaemonState {
    fn default() -> Self {
        Self::new()
    }
}
