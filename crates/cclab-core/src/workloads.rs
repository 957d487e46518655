//! Demo workloads reachable through ECALL dispatch.
//!
//! Stateless transforms with no invariants of their own; the interesting
//! machinery lives in the enclave and KMS layers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::Result;

#[derive(Debug, Deserialize)]
pub struct KeywordSearchParams {
    pub documents: Vec<String>,
    pub keyword: String,
}

#[derive(Debug, Deserialize)]
pub struct SealedSecretParams {
    pub secret: String,
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct SealedSecretResult {
    pub token: String,
    pub recovered: String,
}

#[derive(Debug, Deserialize)]
pub struct InferenceParams {
    #[serde(default)]
    pub vector: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct InferenceResult {
    pub norm: f64,
    pub commitment: String,
}

#[derive(Debug, Deserialize)]
pub struct CounterParams {
    #[serde(default)]
    pub initial: i64,
    #[serde(default = "default_increments")]
    pub increments: i64,
}

fn default_increments() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct CounterResult {
    pub counter: i64,
    pub mac: String,
}

/// Count whitespace-delimited appearances of the keyword per document,
/// keyed by decimal document index.
pub fn keyword_search(params: &KeywordSearchParams) -> BTreeMap<String, usize> {
    let needle = params.keyword.to_lowercase();
    params
        .documents
        .iter()
        .enumerate()
        .map(|(doc_id, doc)| {
            let count = doc
                .to_lowercase()
                .split_whitespace()
                .filter(|word| *word == needle)
                .count();
            (doc_id.to_string(), count)
        })
        .collect()
}

/// L2 norm as a stand-in for model inference, plus a hash commitment over
/// the input vector.
pub fn inference(params: &InferenceParams) -> Result<InferenceResult> {
    let norm = params.vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    let encoded = serde_json::to_vec(&params.vector)?;
    Ok(InferenceResult {
        norm,
        commitment: hex::encode(Sha256::digest(&encoded)),
    })
}

/// Increment a counter and tag the result. A negative increment count runs
/// zero iterations; the boundary rejects it before it gets here.
pub fn counter(params: &CounterParams) -> CounterResult {
    let mut value = params.initial;
    for _ in 0..params.increments {
        value += 1;
    }
    let mac = hex::encode(Sha256::digest(
        format!("{}:{}", value, params.increments).as_bytes(),
    ));
    CounterResult { counter: value, mac }
}
