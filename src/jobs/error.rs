//! # Errores del Sistema de Jobs
//! src/jobs/error.rs
//!
//! Dos familias de errores:
//! - `RegistryError`: fallos al registrar, buscar o liberar jobs en el registro.
//! - `JobError`: fallos sobre un job concreto (interrupción, thread incorrecto,
//!   índice de sub-tarea fuera de rango).

use crate::jobs::types::JobId;
use std::thread::ThreadId;
use thiserror::Error;

/// Errores del registro de jobs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Ya existe un job vivo con ese ID; hay que reservar uno nuevo
    #[error("a job with id {0} is already registered")]
    DuplicateId(JobId),

    /// El thread que llama ya tiene un job vivo asociado
    #[error("thread {thread:?} is already running job {current}")]
    AlreadyWorking { thread: ThreadId, current: JobId },

    /// El usuario alcanzó su límite de jobs simultáneos
    #[error("user '{user_id}' already has {max} running jobs, try again later")]
    TooManyJobs { user_id: String, max: usize },

    /// No se pudo generar un ID libre tras agotar los intentos
    #[error("could not generate a free job id after {attempts} attempts")]
    IdGenerationExhausted { attempts: u32 },

    #[error("job {0} was already released")]
    AlreadyReleased(JobId),

    #[error("job {0} cannot be released before it terminates")]
    NotTerminated(JobId),

    #[error("job {0} not found")]
    NotFound(JobId),
}

impl RegistryError {
    /// Indica si el que llama puede reintentar o informar al usuario sin
    /// abortar el proceso
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RegistryError::IdGenerationExhausted { .. })
    }
}

/// Errores sobre un job concreto
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Señal de cancelación cooperativa: el worker debe dejar de trabajar
    #[error("job {0} was interrupted")]
    Interrupted(JobId),

    /// Operación reservada al thread dueño del job
    #[error("job {job} can only be checked from its owning thread")]
    WrongThread { job: JobId },

    #[error("task index {index} out of range for job {job} ({count} tasks)")]
    TaskOutOfRange { job: JobId, index: usize, count: usize },

    /// El job ya terminó; su progreso no cambia más
    #[error("job {0} already terminated")]
    AlreadyTerminated(JobId),
}

impl JobError {
    pub fn is_interruption(&self) -> bool {
        matches!(self, JobError::Interrupted(_))
    }
}
