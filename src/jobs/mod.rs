//! # Sistema de Jobs
//! src/jobs/mod.rs
//!
//! Seguimiento de trabajos largos e interrumpibles, uno por thread worker.
//!
//! ## Componentes
//!
//! - `cancel`: token de cancelación cooperativa compartido job/worker
//! - `job`: estado de un job (sub-tareas, terminación, interrupción)
//! - `registry`: registro concurrente de jobs vivos
//! - `types`: IDs, estados y snapshots serializables
//! - `error`: errores del registro y de los jobs

pub mod cancel;
pub mod error;
pub mod job;
pub mod registry;
pub mod types;

pub use cancel::CancellationToken;
pub use error::{JobError, RegistryError};
pub use job::Job;
pub use registry::{JobRegistry, RegistryConfig};
pub use types::{JobId, JobSnapshot, JobStatus};
