use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Request Types - Enclave
// ============================================================================

/// Demo workloads the compute endpoint accepts. Anything else fails
/// deserialization before it reaches a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadKind {
    KeywordSearch,
    SealedSecret,
    Inference,
    Counter,
}

impl WorkloadKind {
    /// ECALL operation name for this workload.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::KeywordSearch => "keyword_search",
            WorkloadKind::SealedSecret => "sealed_secret",
            WorkloadKind::Inference => "inference",
            WorkloadKind::Counter => "counter",
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ComputeRequest {
    pub enclave_name: String,
    pub workload: WorkloadKind,
    #[serde(default = "default_payload")]
    pub payload: Value,
}

fn default_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AttestationRequest {
    pub enclave_name: String,
    #[serde(default = "default_policy_version")]
    pub policy_version: String,
}

fn default_policy_version() -> String {
    "v1".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SealRequest {
    pub enclave_name: String,
    pub identity: String,
    #[serde(default = "default_payload")]
    pub data: Value,
}

// ============================================================================
// Response Types - Enclave
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ComputeResponse {
    pub mrenclave: String,
    pub result: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttestationResponse {
    pub mrenclave: String,
    pub signer: String,
    pub nonce: String,
    pub policy_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SealResponse {
    pub token: String,
}

// ============================================================================
// Request Types - VM
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct VmLaunchRequest {
    pub owner: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VmEncryptRequest {
    pub vm_id: String,
    pub page_id: u64,
    /// Base64-encoded page contents.
    pub payload: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct VmAttestQuery {
    pub vm_id: String,
}

// ============================================================================
// Response Types - VM
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct VmLaunchResponse {
    pub vm_id: String,
    pub vcpu_id: u32,
    pub measurement: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VmEncryptResponse {
    pub vm_id: String,
    pub page_id: u64,
    pub measurement: String,
    pub mac: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VmAttestationResponse {
    pub vm_id: String,
    pub nonce: String,
    pub measurement: String,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}
