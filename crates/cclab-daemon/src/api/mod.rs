pub mod enclave;
pub mod vm;

use std::sync::Arc;

use axum::{
    response::Json,
    routing::{get, post},
    Extension, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::state::DaemonState;

/// Lightweight heartbeat.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Build the daemon router with all routes and shared state attached.
pub fn router(state: Arc<DaemonState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/enclave/compute", post(enclave::compute))
        .route("/enclave/attest", post(enclave::attest))
        .route("/enclave/seal", post(enclave::seal))
        .route("/vm/launch", post(vm::launch))
        .route("/vm/encrypt", post(vm::encrypt))
        .route("/vm/attest", post(vm::attest))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router() -> Router {
        router(Arc::new(DaemonState::new()))
    }

    async fn get_path(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        read_response(response).await
    }

    async fn post_json(router: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        read_response(response).await
    }

    async fn read_response(response: axum::response::Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_path(test_router(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_keyword_search_workload() {
        let (status, body) = post_json(
            test_router(),
            "/enclave/compute",
            json!({
                "enclave_name": "demo",
                "workload": "keyword_search",
                "payload": {
                    "documents": ["hello secure world", "secure enclaves"],
                    "keyword": "secure",
                },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["0"], 1);
        assert_eq!(body["result"]["1"], 1);
        assert_eq!(body["mrenclave"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_invalid_keyword_payload_validation() {
        let (status, body) = post_json(
            test_router(),
            "/enclave/compute",
            json!({
                "enclave_name": "demo",
                "workload": "keyword_search",
                "payload": { "documents": [123], "keyword": "" },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "UNPROCESSABLE_ENTITY");
    }

    #[tokio::test]
    async fn test_counter_validation() {
        let (status, _) = post_json(
            test_router(),
            "/enclave/compute",
            json!({
                "enclave_name": "demo",
                "workload": "counter",
                "payload": { "initial": 0, "increments": -1 },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_attestation_endpoint() {
        let (status, report) = post_json(
            test_router(),
            "/enclave/attest",
            json!({ "enclave_name": "demo" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["mrenclave"].as_str().unwrap().len(), 64);
        assert_eq!(report["nonce"].as_str().unwrap().len(), 32);
        assert_eq!(report["policy_version"], "v1");
        assert_eq!(report["signer"], "lab");
    }

    #[tokio::test]
    async fn test_sealing_round_trip() {
        let router = test_router();

        let (status, body) = post_json(
            router.clone(),
            "/enclave/seal",
            json!({
                "enclave_name": "demo",
                "identity": "alice",
                "data": { "secret": "value" },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["token"].as_str().unwrap().is_empty());

        let (status, body) = post_json(
            router,
            "/enclave/compute",
            json!({
                "enclave_name": "demo",
                "workload": "sealed_secret",
                "payload": { "secret": "value", "identity": "alice" },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["recovered"], "value");
    }

    #[tokio::test]
    async fn test_vm_launch_and_encrypt() {
        let router = test_router();

        let (status, vm_info) =
            post_json(router.clone(), "/vm/launch", json!({ "owner": "researcher" })).await;
        assert_eq!(status, StatusCode::OK);
        let vm_id = vm_info["vm_id"].as_str().unwrap().to_string();
        assert_eq!(vm_info["vcpu_id"], 0);
        assert_eq!(vm_info["measurement"].as_str().unwrap().len(), 64);

        let (status, payload) = post_json(
            router.clone(),
            "/vm/encrypt",
            json!({ "vm_id": vm_id, "page_id": 1, "payload": "ZGVtbw==" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["vm_id"], vm_id.as_str());
        assert_eq!(payload["measurement"].as_str().unwrap().len(), 64);
        assert_eq!(payload["mac"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_vm_attest_via_post() {
        let router = test_router();
        let (_, vm_info) =
            post_json(router.clone(), "/vm/launch", json!({ "owner": "researcher" })).await;
        let vm_id = vm_info["vm_id"].as_str().unwrap();

        let (status, report) = post_json(
            router,
            &format!("/vm/attest?vm_id={}", vm_id),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["vm_id"], vm_id);
        assert_eq!(report["measurement"].as_str().unwrap().len(), 64);
        assert_eq!(report["nonce"].as_str().unwrap().len(), 32);
    }

    #[tokio::test]
    async fn test_encrypt_missing_vm_returns_not_found() {
        let (status, body) = post_json(
            test_router(),
            "/vm/encrypt",
            json!({ "vm_id": "unknown", "page_id": 0, "payload": "ZGVtbw==" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_encrypt_rejects_bad_payload() {
        let router = test_router();
        let (_, vm_info) =
            post_json(router.clone(), "/vm/launch", json!({ "owner": "researcher" })).await;
        let vm_id = vm_info["vm_id"].as_str().unwrap().to_string();

        let (status, _) = post_json(
            router,
            "/vm/encrypt",
            json!({ "vm_id": vm_id, "page_id": 0, "payload": "not base64 !!" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_launch_rejects_empty_owner() {
        let (status, _) = post_json(test_router(), "/vm/launch", json!({ "owner": "" })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_workload_rejected_by_schema() {
        let (status, _) = post_json(
            test_router(),
            "/enclave/compute",
            json!({ "enclave_name": "demo", "workload": "format_disk" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
