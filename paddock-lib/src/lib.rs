#![forbid(unsafe_code)]

pub mod admission;
pub mod config;
pub mod error;
pub mod gate;
pub mod server;
pub mod telemetry;

pub use admission::{
    AdmissionEngine, AdmissionResult, EndpointCategory, Identity, QuotaConfig, QuotaTable, RoleTag,
};
pub use config::{load_from_path, Config};
pub use error::{GateError, Result};
pub use gate::{AdmissionGate, Decision, GateBuilder, GateOutcome, RequestInfo};
pub use server::{run, serve};
