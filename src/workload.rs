//! # Carga de Demostración
//! src/workload.rs
//!
//! Lanza un pool de threads worker que registran jobs en un `JobRegistry`,
//! avanzan sus sub-tareas y los liberan. Un coordinador interrumpe uno de
//! cada N jobs. Sirve para ver el registro funcionando bajo concurrencia
//! real: un job por thread, límite por usuario e interrupción cooperativa.

use crate::config::Config;
use crate::jobs::{Job, JobError, JobId, JobRegistry, JobStatus, RegistryError};
use serde::Serialize;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reintentos de registro ante `TooManyJobs` antes de rendirse
const MAX_REGISTER_ATTEMPTS: u32 = 200;

/// Parámetros de la carga
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub workers: usize,
    pub users: usize,
    pub tasks: usize,
    pub task_ms: u64,
    pub interrupt_every: usize,
}

impl WorkloadConfig {
    /// Crea una configuración desde el Config principal
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.workers,
            users: config.users.max(1),
            tasks: config.tasks,
            task_ms: config.task_ms,
            interrupt_every: config.interrupt_every,
        }
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis((self.task_ms / 2).max(5))
    }
}

/// Resultado agregado de la carga
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadReport {
    pub succeeded: usize,
    pub interrupted: usize,
    pub failed: usize,

    /// Workers que no lograron registrar su job
    pub gave_up: usize,

    /// Registros rechazados por `TooManyJobs` y reintentados
    pub retries: u32,

    /// Máximo de jobs vivos observado para un mismo usuario
    pub max_running_per_user: usize,
}

impl WorkloadReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.interrupted + self.failed + self.gave_up
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Lo que reporta cada worker al terminar
#[derive(Debug)]
struct WorkerOutcome {
    status: Option<JobStatus>,
    retries: u32,
    observed_running: usize,
}

/// Ejecuta la carga completa y espera a que todos los workers terminen
pub fn run(config: &WorkloadConfig, registry: &JobRegistry) -> WorkloadReport {
    let (started_tx, started_rx) = mpsc::channel::<JobId>();

    let handles: Vec<_> = (0..config.workers)
        .map(|index| {
            let registry = registry.clone();
            let config = config.clone();
            let started_tx = started_tx.clone();
            let user = format!("user-{}", index % config.users);

            thread::spawn(move || worker_loop(index, user, registry, config, started_tx))
        })
        .collect();

    // Sin esto el canal nunca se cierra
    drop(started_tx);

    let mut seen = 0;
    for id in started_rx {
        seen += 1;
        if config.interrupt_every > 0 && seen % config.interrupt_every == 0 {
            match registry.interrupt(id) {
                Ok(()) => info!(job = %id, "interrupting job"),
                Err(e) => debug!("could not interrupt job {}: {}", id, e),
            }
        }
    }

    let mut report = WorkloadReport::default();
    for handle in handles {
        let outcome = match handle.join() {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("worker thread panicked");
                report.failed += 1;
                continue;
            }
        };

        report.retries += outcome.retries;
        report.max_running_per_user = report.max_running_per_user.max(outcome.observed_running);
        match outcome.status {
            Some(JobStatus::Succeeded) => report.succeeded += 1,
            Some(JobStatus::Interrupted) => report.interrupted += 1,
            Some(_) => report.failed += 1,
            None => report.gave_up += 1,
        }
    }

    report
}

/// Loop principal del worker
fn worker_loop(
    index: usize,
    user: String,
    registry: JobRegistry,
    config: WorkloadConfig,
    started_tx: mpsc::Sender<JobId>,
) -> WorkerOutcome {
    let mut outcome = WorkerOutcome {
        status: None,
        retries: 0,
        observed_running: 0,
    };

    let job = loop {
        match registry.register_new(Some(&user), format!("analysis-{}", index), config.tasks) {
            Ok(job) => break job,
            Err(RegistryError::TooManyJobs { .. }) if outcome.retries < MAX_REGISTER_ATTEMPTS => {
                outcome.retries += 1;
                thread::sleep(config.retry_delay());
            }
            Err(e) => {
                warn!("worker {} could not register a job for {}: {}", index, user, e);
                return outcome;
            }
        }
    };

    outcome.observed_running = registry.running_count_for_user(&user);
    info!(job = %job.id(), user = %user, "worker {} picked up job", index);
    if let Err(e) = started_tx.send(job.id()) {
        // El coordinador ya no escucha
        debug!("worker {} could not announce job {}: {}", index, e.0, e);
    }

    job.start_job();
    match run_tasks(&job, Duration::from_millis(config.task_ms)) {
        Ok(()) => job.complete_with_success(),
        Err(e) if e.is_interruption() => info!(job = %job.id(), "job stopped on request"),
        Err(e) => {
            error!(job = %job.id(), "job failed: {}", e);
            job.complete();
        }
    }

    outcome.status = Some(job.status());
    job.release();
    outcome
}

/// Avanza por las sub-tareas del job, chequeando interrupciones entre pasos
fn run_tasks(job: &Job, task_duration: Duration) -> Result<(), JobError> {
    loop {
        job.check_interrupted()?;
        let step = job.current_task().map_or(1, |index| index + 1);
        job.set_current_task_name(format!("step {}/{}", step, job.task_count()));

        job.sleep(task_duration)?;

        if !job.next_task() {
            return Ok(());
        }
    }
}
