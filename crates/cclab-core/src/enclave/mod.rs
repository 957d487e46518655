// SGX-style enclave simulation
pub mod registry;
pub mod runtime;

pub use registry::EnclaveRegistry;
pub use runtime::{AttestationReport, EcallOp, Enclave, MemoryPage};
