//! VM launch manager: owns simulated VMs and orchestrates page encryption,
//! vCPU launch, and attestation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::kms::KeyService;
use crate::sev::{EncryptedMemory, VcpuState, Vm, VmAttestation};
use crate::{LabError, Result};

/// Receipt returned after a page write, carrying the refreshed measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReceipt {
    pub vm_id: String,
    pub page_id: u64,
    pub measurement: String,
    pub mac: String,
}

/// Owns VMs keyed by generated id, for the process lifetime.
///
/// Ids are 6 random bytes hex-encoded; collision is not detected or retried
/// (negligible at this scale, a production system would check).
pub struct VmLaunchManager {
    kms: Arc<KeyService>,
    vms: RwLock<HashMap<String, Arc<Mutex<Vm>>>>,
}

impl VmLaunchManager {
    pub fn new(kms: Arc<KeyService>) -> Self {
        Self {
            kms,
            vms: RwLock::new(HashMap::new()),
        }
    }

    /// Create and register a VM with empty encrypted memory.
    pub fn create_vm(&self, owner: &str) -> Arc<Mutex<Vm>> {
        let mut id_bytes = [0u8; 6];
        OsRng.fill_bytes(&mut id_bytes);
        let vm_id = hex::encode(id_bytes);

        let memory = EncryptedMemory::new(&vm_id, self.kms.clone());
        let vm = Arc::new(Mutex::new(Vm::new(&vm_id, owner, memory)));
        self.vms.write().unwrap().insert(vm_id.clone(), vm.clone());
        tracing::info!("VM {} created for owner '{}'", vm_id, owner);
        vm
    }

    /// Encrypt a page for a VM and refresh its measurement.
    pub fn encrypt_page(&self, vm_id: &str, page_id: u64, data: &[u8]) -> Result<PageReceipt> {
        let vm = self.require_vm(vm_id)?;
        let mut vm = vm.lock().unwrap();
        let page = vm.write_page(page_id, data);
        let measurement = vm.measure();
        Ok(PageReceipt {
            vm_id: vm_id.to_string(),
            page_id,
            measurement,
            mac: page.mac,
        })
    }

    /// Launch a vCPU on an existing VM.
    pub fn launch_vcpu(&self, vm_id: &str) -> Result<VcpuState> {
        let vm = self.require_vm(vm_id)?;
        let vcpu = vm.lock().unwrap().launch_vcpu();
        Ok(vcpu)
    }

    /// Issue an attestation report for a VM.
    pub fn attest(&self, vm_id: &str) -> Result<VmAttestation> {
        let vm = self.require_vm(vm_id)?;
        let report = vm.lock().unwrap().attest();
        Ok(report)
    }

    fn require_vm(&self, vm_id: &str) -> Result<Arc<Mutex<Vm>>> {
        self.vms
            .read()
            .unwrap()
            .get(vm_id)
            .cloned()
            .ok_or_else(|| LabError::VmNotFound(vm_id.to_string()))
    }
}
