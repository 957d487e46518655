//! Simulated SEV VM: vCPUs, measurement chain, attestation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::kms::random_nonce;
use crate::sev::{EncryptedMemory, EncryptedPage};

/// Minimal register file tracked per vCPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFile {
    pub rip: u64,
    pub rsp: u64,
}

/// One simulated vCPU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcpuState {
    pub id: u32,
    pub registers: RegisterFile,
}

/// Attestation report for a simulated VM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmAttestation {
    pub vm_id: String,
    pub nonce: String,
    pub measurement: String,
}

/// One simulated SEV VM with encrypted memory.
///
/// The measurement is refreshed explicitly (the launch manager re-measures
/// after page writes); between refreshes `last_measurement` may be stale
/// relative to memory contents.
pub struct Vm {
    vm_id: String,
    owner: String,
    memory: EncryptedMemory,
    vcpus: Vec<VcpuState>,
    measurement: Option<String>,
}

impl Vm {
    pub fn new(vm_id: impl Into<String>, owner: impl Into<String>, memory: EncryptedMemory) -> Self {
        Self {
            vm_id: vm_id.into(),
            owner: owner.into(),
            memory,
            vcpus: Vec::new(),
            measurement: None,
        }
    }

    pub fn vm_id(&self) -> &str {
        &self.vm_id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn vcpus(&self) -> &[VcpuState] {
        &self.vcpus
    }

    pub fn last_measurement(&self) -> Option<&str> {
        self.measurement.as_deref()
    }

    /// Encrypt and store a guest page.
    pub fn write_page(&mut self, page_id: u64, data: &[u8]) -> EncryptedPage {
        self.memory.write(page_id, data)
    }

    /// Read back and decrypt a guest page.
    pub fn read_page(&self, page_id: u64) -> crate::Result<Vec<u8>> {
        self.memory.read(page_id)
    }

    /// Append a new vCPU with a zeroed register file. Ids are sequential
    /// starting at 0.
    pub fn launch_vcpu(&mut self) -> VcpuState {
        let vcpu = VcpuState {
            id: self.vcpus.len() as u32,
            registers: RegisterFile { rip: 0, rsp: 0 },
        };
        self.vcpus.push(vcpu.clone());
        tracing::info!("vCPU {} launched on VM {}", vcpu.id, self.vm_id);
        vcpu
    }

    /// Chain a measurement over VM identity and every encrypted page in
    /// ascending page-id order. Idempotent; does not touch page contents.
    pub fn measure(&mut self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.vm_id.as_bytes());
        hasher.update(self.owner.as_bytes());
        for page in self.memory.pages() {
            hasher.update(page.ciphertext.as_bytes());
            hasher.update(page.mac.as_bytes());
            hasher.update(page.page_id.to_string().as_bytes());
        }
        let measurement = hex::encode(hasher.finalize());
        self.measurement = Some(measurement.clone());
        tracing::info!("VM {} measured: {}", self.vm_id, measurement);
        measurement
    }

    /// Issue an attestation report, measuring first if no measurement has
    /// been taken yet.
    pub fn attest(&mut self) -> VmAttestation {
        let measurement = match &self.measurement {
            Some(measurement) => measurement.clone(),
            None => self.measure(),
        };
        let report = VmAttestation {
            vm_id: self.vm_id.clone(),
            nonce: random_nonce(),
            measurement,
        };
        tracing::info!("VM {} attestation issued, nonce {}", self.vm_id, report.nonce);
        report
    }
}
