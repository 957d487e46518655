//! VM routes: launch, page encryption, attestation.

use std::sync::Arc;

use axum::extract::Query;
use axum::{response::Json, Extension};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use cclab_models::{
    VmAttestQuery, VmAttestationResponse, VmEncryptRequest, VmEncryptResponse, VmLaunchRequest,
    VmLaunchResponse,
};

use crate::error::{ApiError, ApiResult};
use crate::state::DaemonState;

const MAX_OWNER_LEN: usize = 128;
const MAX_PAGE_BYTES: usize = 8192;

/// Create a VM, initialise a vCPU, and return the measurement.
pub async fn launch(
    Extension(state): Extension<Arc<DaemonState>>,
    Json(req): Json<VmLaunchRequest>,
) -> ApiResult<Json<VmLaunchResponse>> {
    if req.owner.is_empty() || req.owner.len() > MAX_OWNER_LEN {
        return Err(ApiError::Unprocessable(format!(
            "owner must be between 1 and {} characters",
            MAX_OWNER_LEN
        )));
    }

    let vm = state.vms.create_vm(&req.owner);
    let mut vm = vm.lock().unwrap();
    let vcpu = vm.launch_vcpu();
    let measurement = vm.measure();

    tracing::info!("VM {} launched for owner '{}'", vm.vm_id(), req.owner);
    Ok(Json(VmLaunchResponse {
        vm_id: vm.vm_id().to_string(),
        vcpu_id: vcpu.id,
        measurement,
    }))
}

/// Encrypt a VM memory page and refresh the VM measurement.
pub async fn encrypt(
    Extension(state): Extension<Arc<DaemonState>>,
    Json(req): Json<VmEncryptRequest>,
) -> ApiResult<Json<VmEncryptResponse>> {
    let payload = STANDARD
        .decode(&req.payload)
        .map_err(|_| ApiError::Unprocessable("payload must be base64-encoded".to_string()))?;
    if payload.is_empty() || payload.len() > MAX_PAGE_BYTES {
        return Err(ApiError::Unprocessable(format!(
            "payload must decode to between 1 and {} bytes",
            MAX_PAGE_BYTES
        )));
    }

    let receipt = state.vms.encrypt_page(&req.vm_id, req.page_id, &payload)?;
    Ok(Json(VmEncryptResponse {
        vm_id: receipt.vm_id,
        page_id: receipt.page_id,
        measurement: receipt.measurement,
        mac: receipt.mac,
    }))
}

/// Issue a simulated attestation report for a VM.
pub async fn attest(
    Extension(state): Extension<Arc<DaemonState>>,
    Query(params): Query<VmAttestQuery>,
) -> ApiResult<Json<VmAttestationResponse>> {
    let report = state.vms.attest(&params.vm_id)?;
    Ok(Json(VmAttestationResponse {
        vm_id: report.vm_id,
        nonce: report.nonce,
        measurement: report.measurement,
    }))
}
