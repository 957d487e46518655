//! Enclave lifecycle: load, measure, ECALL/OCALL transitions, sealed
//! storage, attestation.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::kms::{random_nonce, KeyService};
use crate::{workloads, LabError, Result};

/// Synthetic address stride between loaded segments.
const PAGE_STRIDE: usize = 0x1000;

/// Signer identity used for registry-created enclaves.
pub const DEFAULT_SIGNER: &str = "lab";

/// A bounds-checked region of simulated enclave memory.
#[derive(Debug, Clone)]
pub struct MemoryPage {
    address: usize,
    size: usize,
    data: Vec<u8>,
}

impl MemoryPage {
    pub fn new(address: usize, size: usize) -> Self {
        Self {
            address,
            size,
            data: Vec::new(),
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Write into the page, enforcing the declared capacity.
    pub fn write(&mut self, content: &[u8]) -> Result<()> {
        if content.len() > self.size {
            return Err(LabError::PageOverflow {
                len: content.len(),
                size: self.size,
            });
        }
        self.data = content.to_vec();
        Ok(())
    }

    pub fn read(&self) -> &[u8] {
        &self.data
    }
}

/// Attestation report for a simulated enclave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationReport {
    pub mrenclave: String,
    pub signer: String,
    pub nonce: String,
    pub policy_version: String,
}

/// The closed set of trusted operations an enclave will dispatch.
///
/// Dispatch is an explicit lookup, never reflection, so the trusted surface
/// stays enumerable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcallOp {
    Seal,
    Unseal,
    Attest,
    KeywordSearch,
    SealedSecret,
    Inference,
    Counter,
}

impl EcallOp {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "seal" => Some(Self::Seal),
            "unseal" => Some(Self::Unseal),
            "attest" => Some(Self::Attest),
            "keyword_search" => Some(Self::KeywordSearch),
            "sealed_secret" => Some(Self::SealedSecret),
            "inference" => Some(Self::Inference),
            "counter" => Some(Self::Counter),
            _ => None,
        }
    }
}

/// One simulated enclave.
///
/// The lifecycle is a one-way state machine: instances start uninitialized
/// and become loaded after the first successful [`load`](Self::load). There
/// is no unload; reloading with different segments changes the measurement
/// and permanently orphans previously sealed data.
pub struct Enclave {
    name: String,
    signer: String,
    pages: Vec<MemoryPage>,
    loaded: bool,
    mrenclave: String,
    sealed_store: HashMap<String, String>,
    kms: Arc<KeyService>,
}

impl Enclave {
    pub fn new(name: impl Into<String>, kms: Arc<KeyService>) -> Self {
        Self::with_signer(name, DEFAULT_SIGNER, kms)
    }

    pub fn with_signer(
        name: impl Into<String>,
        signer: impl Into<String>,
        kms: Arc<KeyService>,
    ) -> Self {
        let name = name.into();
        tracing::debug!("enclave '{}' created", name);
        Self {
            name,
            signer: signer.into(),
            pages: Vec::new(),
            loaded: false,
            mrenclave: String::new(),
            sealed_store: HashMap::new(),
            kms,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signer(&self) -> &str {
        &self.signer
    }

    pub fn mrenclave(&self) -> &str {
        &self.mrenclave
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Load code/data segments and compute the measurement.
    ///
    /// Segments are laid out as pages at fixed stride addresses; the
    /// measurement digests page data in load order, then name and signer.
    pub fn load(&mut self, segments: &[Vec<u8>]) -> Result<String> {
        if segments.is_empty() {
            return Err(LabError::InvalidSegments(
                "at least one segment is required".to_string(),
            ));
        }
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(LabError::InvalidSegments(
                "segments must be non-empty".to_string(),
            ));
        }

        let mut pages = Vec::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            let mut page = MemoryPage::new(i * PAGE_STRIDE, seg.len());
            page.write(seg)?;
            pages.push(page);
        }
        self.pages = pages;
        self.mrenclave = self.measure();
        self.loaded = true;
        tracing::info!("enclave '{}' loaded, mrenclave {}", self.name, self.mrenclave);
        Ok(self.mrenclave.clone())
    }

    fn measure(&self) -> String {
        let mut hasher = Sha256::new();
        for page in &self.pages {
            hasher.update(page.read());
        }
        hasher.update(self.name.as_bytes());
        hasher.update(self.signer.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn require_loaded(&self) -> Result<()> {
        if self.loaded {
            Ok(())
        } else {
            Err(LabError::EnclaveNotLoaded(self.name.clone()))
        }
    }

    /// Dispatch a trusted call by name.
    pub fn ecall(&mut self, name: &str, args: Value) -> Result<Value> {
        self.require_loaded()?;
        let op = EcallOp::parse(name).ok_or_else(|| LabError::UnknownEcall(name.to_string()))?;
        tracing::debug!("ECALL '{}' on enclave '{}'", name, self.name);

        match op {
            EcallOp::Seal => {
                let identity = args
                    .get("identity")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let data = args.get("data").cloned().unwrap_or_else(|| json!({}));
                let token = self.seal(&identity, data)?;
                Ok(json!({ "token": token }))
            }
            EcallOp::Unseal => {
                let identity = args
                    .get("identity")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.unseal(&identity)
            }
            EcallOp::Attest => {
                let policy_version = args
                    .get("policy_version")
                    .and_then(Value::as_str)
                    .unwrap_or("v1");
                let report = self.attest(policy_version)?;
                Ok(serde_json::to_value(report)?)
            }
            EcallOp::KeywordSearch => {
                let params: workloads::KeywordSearchParams = serde_json::from_value(args)?;
                Ok(serde_json::to_value(workloads::keyword_search(&params))?)
            }
            EcallOp::SealedSecret => {
                let params: workloads::SealedSecretParams = serde_json::from_value(args)?;
                let token = self.seal(&params.identity, json!({ "secret": params.secret }))?;
                let recovered = self.unseal(&params.identity)?;
                let result = workloads::SealedSecretResult {
                    token,
                    recovered: recovered
                        .get("secret")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                };
                Ok(serde_json::to_value(result)?)
            }
            EcallOp::Inference => {
                let params: workloads::InferenceParams = serde_json::from_value(args)?;
                Ok(serde_json::to_value(workloads::inference(&params)?)?)
            }
            EcallOp::Counter => {
                let params: workloads::CounterParams = serde_json::from_value(args)?;
                Ok(serde_json::to_value(workloads::counter(&params))?)
            }
        }
    }

    /// Simulate a transition out to the untrusted host. Returns an echo
    /// record; deliberately free of side effects.
    pub fn ocall(&self, name: &str, payload: Value) -> Value {
        tracing::debug!("OCALL '{}' from enclave '{}'", name, self.name);
        json!({ "call": name, "echo": payload })
    }

    /// Seal data to this enclave's current measurement and an identity.
    ///
    /// The key is derived with the measurement as context, so the token is
    /// only recoverable while the enclave keeps the same code identity.
    /// Sealing twice under one identity keeps only the latest token.
    pub fn seal(&mut self, identity: &str, data: Value) -> Result<String> {
        self.require_loaded()?;
        if identity.is_empty() {
            return Err(LabError::IdentityRequired);
        }
        let key = self.kms.derive_key(identity, &self.mrenclave);
        let blob = serde_json::to_vec(&data)?;
        let token = self.kms.encrypt(&key, &blob);
        self.sealed_store.insert(identity.to_string(), token.clone());
        tracing::info!("sealed data for identity '{}' in enclave '{}'", identity, self.name);
        Ok(token)
    }

    /// Unseal previously sealed data for an identity.
    pub fn unseal(&self, identity: &str) -> Result<Value> {
        self.require_loaded()?;
        let token = self
            .sealed_store
            .get(identity)
            .ok_or_else(|| LabError::NoSealedData(identity.to_string()))?;
        let key = self.kms.derive_key(identity, &self.mrenclave);
        let blob = self.kms.decrypt(&key, token)?;
        Ok(serde_json::from_slice(&blob)?)
    }

    /// Produce an attestation report with a fresh nonce.
    ///
    /// Reflects the measurement from the last load; never mutates state.
    pub fn attest(&self, policy_version: &str) -> Result<AttestationReport> {
        self.require_loaded()?;
        let report = AttestationReport {
            mrenclave: self.mrenclave.clone(),
            signer: self.signer.clone(),
            nonce: random_nonce(),
            policy_version: policy_version.to_string(),
        };
        tracing::info!(
            "attestation generated for enclave '{}', nonce {}",
            self.name,
            report.nonce
        );
        Ok(report)
    }
}
