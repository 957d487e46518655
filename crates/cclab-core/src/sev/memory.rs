//! Per-VM encrypted page store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::kms::{DerivedKey, KeyService};
use crate::{LabError, Result};

/// Stored form of an encrypted guest page.
///
/// `mac` is an independent SHA-256 digest of the token, kept alongside the
/// authenticated token itself; both checks run on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPage {
    pub page_id: u64,
    pub ciphertext: String,
    pub mac: String,
}

/// Encrypted memory scoped to one VM.
///
/// Pages are keyed by id in an ordered map; ascending iteration order is
/// part of the measurement contract.
pub struct EncryptedMemory {
    vm_id: String,
    pages: BTreeMap<u64, EncryptedPage>,
    kms: Arc<KeyService>,
}

impl EncryptedMemory {
    pub fn new(vm_id: impl Into<String>, kms: Arc<KeyService>) -> Self {
        Self {
            vm_id: vm_id.into(),
            pages: BTreeMap::new(),
            kms,
        }
    }

    fn page_key(&self, page_id: u64) -> DerivedKey {
        self.kms
            .derive_key(&format!("vm:{}", self.vm_id), &page_id.to_string())
    }

    /// Encrypt and store data for a page, replacing any prior entry.
    pub fn write(&mut self, page_id: u64, data: &[u8]) -> EncryptedPage {
        let key = self.page_key(page_id);
        let token = self.kms.encrypt(&key, data);
        let page = EncryptedPage {
            page_id,
            mac: Self::digest(&token),
            ciphertext: token,
        };
        self.pages.insert(page_id, page.clone());
        tracing::debug!("stored encrypted page {} for VM {}", page_id, self.vm_id);
        page
    }

    /// Read and decrypt a stored page.
    ///
    /// The stored digest is recomputed and compared before the KMS tag check
    /// ever runs; a mismatch in either is fatal to the read.
    pub fn read(&self, page_id: u64) -> Result<Vec<u8>> {
        let page = self
            .pages
            .get(&page_id)
            .ok_or(LabError::PageNotFound(page_id))?;
        if Self::digest(&page.ciphertext) != page.mac {
            return Err(LabError::IntegrityFailure);
        }
        let key = self.page_key(page_id);
        self.kms.decrypt(&key, &page.ciphertext)
    }

    /// Stored pages in ascending page-id order.
    pub fn pages(&self) -> impl Iterator<Item = &EncryptedPage> {
        self.pages.values()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    fn digest(token: &str) -> String {
        hex::encode(Sha256::digest(token.as_bytes()))
    }
}
