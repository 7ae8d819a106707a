//! # Tipos y Estructuras para el Sistema de Jobs
//! src/jobs/types.rs
//!
//! Define los tipos compartidos entre `Job` y `JobRegistry`: el ID de un job,
//! su estado visible y el snapshot serializable que se expone hacia afuera.

use serde::{Deserialize, Serialize};
use std::fmt;

/// ID numérico de un job, único mientras el job está vivo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Estado de un job, derivado de sus flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Registrado pero todavía sin `start_job()`
    Registered,

    /// Ejecutándose
    Running,

    /// Terminado exitosamente
    Succeeded,

    /// Terminado sin éxito
    Failed,

    /// Terminado tras una interrupción
    Interrupted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Registered => "registered",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Interrupted => "interrupted",
        }
    }

    /// Verifica si el job está en estado terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Interrupted
        )
    }
}

/// Foto consistente de un job en un instante dado
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,

    pub name: String,

    pub user_id: Option<String>,

    pub status: JobStatus,

    /// Número total de sub-tareas
    pub task_count: usize,

    /// Índice de la sub-tarea actual (None hasta que el job arranca)
    pub current_task: Option<usize>,

    pub current_task_name: Option<String>,

    /// Progreso (0-100)
    pub progress: u8,

    pub interrupt_requested: bool,

    pub released: bool,

    /// Tiempo de ejecución en milisegundos (si ya empezó)
    pub execution_ms: Option<u64>,
}

impl JobSnapshot {
    /// Serializa el snapshot a JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Calcula el progreso (0-100) a partir de la sub-tarea actual
pub(crate) fn progress_percent(current_task: Option<usize>, task_count: usize, terminated: bool) -> u8 {
    if terminated {
        return 100;
    }
    match current_task {
        Some(index) if task_count > 0 => ((index * 100) / task_count).min(100) as u8,
        _ => 0,
    }
}
