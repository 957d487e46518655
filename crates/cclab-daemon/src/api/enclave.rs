//! Enclave routes: workload compute, attestation, sealing.

use std::sync::Arc;

use axum::{response::Json, Extension};
use serde_json::{json, Value};

use cclab_models::{
    AttestationRequest, AttestationResponse, ComputeRequest, ComputeResponse, SealRequest,
    SealResponse, WorkloadKind,
};

use crate::error::{ApiError, ApiResult};
use crate::state::DaemonState;

fn validate_keyword_payload(payload: &Value) -> Result<Value, ApiError> {
    let documents = payload.get("documents").cloned().unwrap_or_else(|| json!([]));
    let all_strings = documents
        .as_array()
        .map(|docs| docs.iter().all(Value::is_string))
        .unwrap_or(false);
    if !all_strings {
        return Err(ApiError::Unprocessable(
            "documents must be a list of strings".to_string(),
        ));
    }
    let keyword = payload.get("keyword").and_then(Value::as_str).unwrap_or("");
    if keyword.is_empty() {
        return Err(ApiError::Unprocessable(
            "keyword must be a non-empty string".to_string(),
        ));
    }
    Ok(json!({ "documents": documents, "keyword": keyword }))
}

fn validate_sealed_payload(payload: &Value) -> Result<Value, ApiError> {
    let secret = payload.get("secret").and_then(Value::as_str);
    let identity = payload.get("identity").and_then(Value::as_str);
    match (secret, identity) {
        (Some(secret), Some(identity)) if !secret.is_empty() && !identity.is_empty() => {
            Ok(json!({ "secret": secret, "identity": identity }))
        }
        (Some(_), Some(_)) => Err(ApiError::Unprocessable(
            "secret and identity cannot be empty".to_string(),
        )),
        _ => Err(ApiError::Unprocessable(
            "secret and identity must be strings".to_string(),
        )),
    }
}

fn validate_inference_payload(payload: &Value) -> Result<Value, ApiError> {
    let vector = payload.get("vector").cloned().unwrap_or_else(|| json!([]));
    let all_numbers = vector
        .as_array()
        .map(|values| values.iter().all(Value::is_number))
        .unwrap_or(false);
    if !all_numbers {
        return Err(ApiError::Unprocessable(
            "vector must be a list of numbers".to_string(),
        ));
    }
    Ok(json!({ "vector": vector }))
}

fn validate_counter_payload(payload: &Value) -> Result<Value, ApiError> {
    let initial = payload.get("initial").cloned().unwrap_or(json!(0));
    let increments = payload.get("increments").cloned().unwrap_or(json!(1));
    if !initial.is_i64() || !increments.is_i64() {
        return Err(ApiError::Unprocessable(
            "initial and increments must be integers".to_string(),
        ));
    }
    if increments.as_i64().unwrap_or(0) < 0 {
        return Err(ApiError::Unprocessable(
            "increments must be non-negative".to_string(),
        ));
    }
    Ok(json!({ "initial": initial, "increments": increments }))
}

fn require_enclave_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::Unprocessable(
            "enclave_name must be non-empty".to_string(),
        ));
    }
    Ok(())
}

/// Run a supported workload inside a simulated enclave.
pub async fn compute(
    Extension(state): Extension<Arc<DaemonState>>,
    Json(req): Json<ComputeRequest>,
) -> ApiResult<Json<ComputeResponse>> {
    require_enclave_name(&req.enclave_name)?;
    let args = match req.workload {
        WorkloadKind::KeywordSearch => validate_keyword_payload(&req.payload)?,
        WorkloadKind::SealedSecret => validate_sealed_payload(&req.payload)?,
        WorkloadKind::Inference => validate_inference_payload(&req.payload)?,
        WorkloadKind::Counter => validate_counter_payload(&req.payload)?,
    };

    let enclave = state.enclaves.get_or_create(&req.enclave_name)?;
    let mut enclave = enclave.lock().unwrap();
    let result = enclave.ecall(req.workload.as_str(), args)?;

    tracing::info!(
        "workload '{}' executed in enclave '{}'",
        req.workload.as_str(),
        req.enclave_name
    );
    Ok(Json(ComputeResponse {
        mrenclave: enclave.mrenclave().to_string(),
        result,
    }))
}

/// Generate an attestation report for an enclave instance.
pub async fn attest(
    Extension(state): Extension<Arc<DaemonState>>,
    Json(req): Json<AttestationRequest>,
) -> ApiResult<Json<AttestationResponse>> {
    require_enclave_name(&req.enclave_name)?;
    if req.policy_version.is_empty() {
        return Err(ApiError::Unprocessable(
            "policy_version must be non-empty".to_string(),
        ));
    }

    let enclave = state.enclaves.get_or_create(&req.enclave_name)?;
    let report = enclave.lock().unwrap().attest(&req.policy_version)?;
    Ok(Json(AttestationResponse {
        mrenclave: report.mrenclave,
        signer: report.signer,
        nonce: report.nonce,
        policy_version: report.policy_version,
    }))
}

/// Seal JSON data to an identity within an enclave.
pub async fn seal(
    Extension(state): Extension<Arc<DaemonState>>,
    Json(req): Json<SealRequest>,
) -> ApiResult<Json<SealResponse>> {
    require_enclave_name(&req.enclave_name)?;
    if req.identity.is_empty() {
        return Err(ApiError::Unprocessable(
            "identity must be non-empty".to_string(),
        ));
    }

    let enclave = state.enclaves.get_or_create(&req.enclave_name)?;
    let token = enclave.lock().unwrap().seal(&req.identity, req.data)?;
    Ok(Json(SealResponse { token }))
}
