//! # Estructura de Job
//! src/jobs/job.rs
//!
//! Representa un trabajo largo e interrumpible, asociado al thread que lo
//! registró. El thread dueño avanza las sub-tareas y marca el resultado;
//! cualquier otro thread puede pedir la interrupción.
//!
//! Ciclo de vida:
//! 1. `JobRegistry::register` crea el job y lo asocia al thread actual
//! 2. El dueño llama `start_job()` y luego `next_task()` por cada sub-tarea,
//!    chequeando `check_interrupted()` en puntos seguros
//! 3. El dueño llama `complete_with_success()` (o `complete()` si falló)
//! 4. El dueño llama `release()` exactamente una vez

use crate::jobs::cancel::CancellationToken;
use crate::jobs::error::JobError;
use crate::jobs::registry::RegistryState;
use crate::jobs::types::{progress_percent, JobId, JobSnapshot, JobStatus};
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Datos internos mutables del job
#[derive(Debug)]
struct JobData {
    current_task: Option<usize>,
    current_task_name: Option<String>,
    started: bool,
    terminated: bool,
    successful: bool,
    /// Terminó por `check_interrupted()`
    interrupted: bool,
    released: bool,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

/// Representa un job individual
#[derive(Debug)]
pub struct Job {
    id: JobId,

    name: String,

    user_id: Option<String>,

    /// Número total de sub-tareas
    task_count: usize,

    /// Thread que registró el job (único autorizado a chequear interrupciones)
    owner: ThreadId,

    token: CancellationToken,

    /// Registro al que pertenece; `Weak` porque el registro guarda el job
    registry: Weak<RegistryState>,

    created_at: Instant,

    /// Datos mutables (protegidos por Mutex)
    data: Mutex<JobData>,
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        user_id: Option<String>,
        name: String,
        task_count: usize,
        owner: ThreadId,
        registry: Weak<RegistryState>,
    ) -> Self {
        Self {
            id,
            name,
            user_id,
            task_count,
            owner,
            token: CancellationToken::new(),
            registry,
            created_at: Instant::now(),
            data: Mutex::new(JobData {
                current_task: None,
                current_task_name: None,
                started: false,
                terminated: false,
                successful: false,
                interrupted: false,
                released: false,
                started_at: None,
                finished_at: None,
            }),
        }
    }

    fn data(&self) -> MutexGuard<'_, JobData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn task_count(&self) -> usize {
        self.task_count
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Copia del token de cancelación, para pasarlo a código que no conoce el job
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    // ==================== Sub-tareas ====================

    /// Marca el job como iniciado y se posiciona en la primera sub-tarea.
    ///
    /// Llamadas repetidas no tienen efecto.
    pub fn start_job(&self) {
        let mut data = self.data();
        if data.started || data.terminated {
            return;
        }
        data.started = true;
        data.started_at = Some(Instant::now());
        data.current_task = if self.task_count > 0 { Some(0) } else { None };
        trace!(job = %self.id, "job started");
    }

    /// Avanza a la siguiente sub-tarea.
    ///
    /// Retorna `false` sin hacer nada si ya estaba en la última o si el job
    /// terminó. Sobre un job no iniciado equivale a `start_job()`.
    pub fn next_task(&self) -> bool {
        let mut data = self.data();
        if data.terminated {
            return false;
        }
        let next = data.current_task.map_or(0, |index| index + 1);
        if next >= self.task_count {
            return false;
        }
        if !data.started {
            data.started = true;
            data.started_at = Some(Instant::now());
        }
        data.current_task = Some(next);
        data.current_task_name = None;
        true
    }

    /// Fija la sub-tarea actual.
    ///
    /// Falla si el índice está fuera de rango o si el job ya terminó. Al
    /// cambiar de sub-tarea se descarta el nombre de la anterior.
    pub fn set_current_task(&self, index: usize) -> Result<(), JobError> {
        if index >= self.task_count {
            return Err(JobError::TaskOutOfRange {
                job: self.id,
                index,
                count: self.task_count,
            });
        }
        let mut data = self.data();
        if data.terminated {
            return Err(JobError::AlreadyTerminated(self.id));
        }
        if !data.started {
            data.started = true;
            data.started_at = Some(Instant::now());
        }
        if data.current_task != Some(index) {
            data.current_task = Some(index);
            data.current_task_name = None;
        }
        Ok(())
    }

    pub fn set_current_task_name(&self, name: impl Into<String>) {
        self.data().current_task_name = Some(name.into());
    }

    /// Índice de la sub-tarea actual (None hasta que el job arranca)
    pub fn current_task(&self) -> Option<usize> {
        self.data().current_task
    }

    pub fn current_task_name(&self) -> Option<String> {
        self.data().current_task_name.clone()
    }

    // ==================== Terminación ====================

    /// Solo la primera llamada tiene efecto; retorna si fue esta
    fn finish(&self, successful: bool, interrupted: bool) -> bool {
        let mut data = self.data();
        if data.terminated {
            return false;
        }
        data.terminated = true;
        data.successful = successful;
        data.interrupted = interrupted;
        data.finished_at = Some(Instant::now());
        true
    }

    /// Marca el job como terminado sin éxito (si no lo estaba)
    pub fn complete(&self) {
        if self.finish(false, false) {
            debug!(job = %self.id, "job completed without success");
        }
    }

    /// Marca el job como terminado con éxito (si no lo estaba)
    pub fn complete_with_success(&self) {
        if self.finish(true, false) {
            debug!(job = %self.id, "job completed successfully");
        }
    }

    pub fn is_started(&self) -> bool {
        self.data().started
    }

    pub fn is_terminated(&self) -> bool {
        self.data().terminated
    }

    /// Nunca es `true` si `is_terminated()` es `false`
    pub fn is_successful(&self) -> bool {
        let data = self.data();
        data.terminated && data.successful
    }

    pub fn is_released(&self) -> bool {
        self.data().released
    }

    // ==================== Interrupción ====================

    /// Pide al thread dueño que se detenga.
    ///
    /// No termina el job: el dueño debe observarlo con `check_interrupted()`.
    pub fn interrupt(&self) {
        if self.token.cancel() {
            debug!(job = %self.id, "interrupt requested");
        }
    }

    pub fn is_interrupt_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    fn ensure_owner(&self) -> Result<(), JobError> {
        if thread::current().id() != self.owner {
            return Err(JobError::WrongThread { job: self.id });
        }
        Ok(())
    }

    /// Chequea si se pidió interrumpir el job.
    ///
    /// Solo puede llamarse desde el thread dueño. Si hubo pedido, el job queda
    /// terminado sin éxito y se retorna `JobError::Interrupted`.
    pub fn check_interrupted(&self) -> Result<(), JobError> {
        self.ensure_owner()?;
        if self.token.is_cancelled() {
            if self.finish(false, true) {
                trace!(job = %self.id, "job stopped after interrupt");
            }
            return Err(JobError::Interrupted(self.id));
        }
        Ok(())
    }

    /// Duerme `duration` en el thread dueño, despertando antes si el job se
    /// interrumpe (en cuyo caso retorna `JobError::Interrupted`)
    pub fn sleep(&self, duration: Duration) -> Result<(), JobError> {
        self.ensure_owner()?;
        self.token.wait_timeout(duration);
        self.check_interrupted()
    }

    // ==================== Liberación ====================

    /// Marca el job como liberado; retorna `false` si ya lo estaba
    pub(crate) fn mark_released(&self) -> bool {
        let mut data = self.data();
        if data.released {
            return false;
        }
        data.released = true;
        true
    }

    /// Libera el job: lo termina si hacía falta y le pide al registro que lo
    /// olvide. Llamadas repetidas no tienen efecto.
    pub fn release(&self) {
        self.complete();
        match self.registry.upgrade() {
            Some(registry) => {
                if let Err(e) = registry.release(self) {
                    trace!(job = %self.id, "release skipped: {}", e);
                }
            }
            None => {
                self.mark_released();
            }
        }
    }

    // ==================== Estado ====================

    pub fn status(&self) -> JobStatus {
        let data = self.data();
        Self::status_of(&data)
    }

    fn status_of(data: &JobData) -> JobStatus {
        if data.terminated {
            if data.successful {
                JobStatus::Succeeded
            } else if data.interrupted {
                JobStatus::Interrupted
            } else {
                JobStatus::Failed
            }
        } else if data.started {
            JobStatus::Running
        } else {
            JobStatus::Registered
        }
    }

    /// Tiempo transcurrido desde la creación
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Tiempo de ejecución (si ya empezó)
    pub fn execution_time(&self) -> Option<Duration> {
        Self::execution_of(&self.data())
    }

    fn execution_of(data: &JobData) -> Option<Duration> {
        data.started_at.map(|start| match data.finished_at {
            Some(end) => end.duration_since(start),
            None => start.elapsed(),
        })
    }

    /// Foto consistente del job, tomada bajo un único lock
    pub fn snapshot(&self) -> JobSnapshot {
        let data = self.data();
        let execution_ms = Self::execution_of(&data).map(|d| d.as_millis() as u64);

        JobSnapshot {
            id: self.id,
            name: self.name.clone(),
            user_id: self.user_id.clone(),
            status: Self::status_of(&data),
            task_count: self.task_count,
            current_task: data.current_task,
            current_task_name: data.current_task_name.clone(),
            progress: progress_percent(data.current_task, self.task_count, data.terminated),
            interrupt_requested: self.token.is_cancelled(),
            released: data.released,
            execution_ms,
        }
    }
}
