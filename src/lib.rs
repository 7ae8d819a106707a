//! # Job Registry
//! src/lib.rs
//!
//! Registro concurrente de trabajos largos e interrumpibles. Cada job queda
//! asociado al thread que lo registró, un usuario puede tener un límite de
//! jobs simultáneos y la cancelación es cooperativa.
//!
//! ## Arquitectura
//!
//! - `jobs`: jobs, registro, token de cancelación y errores
//! - `metrics`: contadores del registro
//! - `config`: configuración CLI / variables de entorno
//! - `workload`: pool de workers de demostración
//!
//! ## Ejemplo de uso
//!
//! ```
//! use job_registry::jobs::{JobRegistry, RegistryConfig};
//!
//! let registry = JobRegistry::new(RegistryConfig::default().with_max_jobs_per_user(1));
//! let job = registry.register_new(Some("alice"), "top anat", 2).unwrap();
//!
//! job.start_job();
//! while job.check_interrupted().is_ok() && job.next_task() {}
//! job.complete_with_success();
//! job.release();
//!
//! assert_eq!(registry.live_count(), 0);
//! ```

pub mod config;
pub mod jobs;
pub mod metrics;
pub mod workload;
