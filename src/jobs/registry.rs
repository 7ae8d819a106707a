//! # Registro Central de Jobs
//! src/jobs/registry.rs
//!
//! Crea, busca y libera jobs de forma thread-safe. Mantiene:
//! - jobs vivos por ID
//! - job vivo por thread dueño (a lo sumo uno por thread)
//! - cantidad de jobs corriendo por usuario (con límite opcional)
//! - IDs reservados o vivos, para entregar IDs antes de crear el job
//!
//! Los mapas son `DashMap`: cada actualización de un contador de usuario se
//! hace dentro del lock de su entrada, nunca como leer-y-después-escribir.

use crate::jobs::error::RegistryError;
use crate::jobs::job::Job;
use crate::jobs::types::{JobId, JobSnapshot};
use crate::metrics::{Rejection, RegistryStats, StatsSnapshot};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tracing::{debug, error, warn};

/// Intentos por defecto para encontrar un ID libre
pub const DEFAULT_MAX_ID_ATTEMPTS: u32 = 16;

/// Configuración del registro
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Máximo de jobs simultáneos por usuario (None = sin límite)
    pub max_jobs_per_user: Option<usize>,

    /// Intentos para encontrar un ID libre antes de rendirse
    pub max_id_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_jobs_per_user: None,
            max_id_attempts: DEFAULT_MAX_ID_ATTEMPTS,
        }
    }
}

impl RegistryConfig {
    /// Crea una configuración desde el Config principal
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            max_jobs_per_user: Self::cap(config.max_jobs_per_user),
            max_id_attempts: config.max_id_attempts,
        }
    }

    /// Fija el límite por usuario; 0 significa sin límite
    pub fn with_max_jobs_per_user(mut self, max: usize) -> Self {
        self.max_jobs_per_user = Self::cap(max);
        self
    }

    pub fn with_max_id_attempts(mut self, attempts: u32) -> Self {
        self.max_id_attempts = attempts;
        self
    }

    fn cap(max: usize) -> Option<usize> {
        (max > 0).then_some(max)
    }
}

/// Estado compartido del registro (los jobs guardan un `Weak` a esto)
#[derive(Debug)]
pub(crate) struct RegistryState {
    jobs: DashMap<JobId, Arc<Job>>,
    by_thread: DashMap<ThreadId, Arc<Job>>,
    running_by_user: DashMap<String, usize>,

    /// IDs reservados o vivos
    ids: DashSet<JobId>,

    next_id: AtomicU64,
    config: RegistryConfig,
    stats: RegistryStats,
}

impl RegistryState {
    fn reject(&self, rejection: Rejection, error: RegistryError) -> RegistryError {
        self.stats.record_rejection(rejection);
        warn!("job registration rejected: {}", error);
        error
    }

    /// Olvida un job terminado
    pub(crate) fn release(&self, job: &Job) -> Result<(), RegistryError> {
        if job.is_released() {
            return Err(RegistryError::AlreadyReleased(job.id()));
        }
        if !job.is_terminated() {
            return Err(RegistryError::NotTerminated(job.id()));
        }
        // Solo se liberan jobs registrados en este mismo registro
        let owned = self
            .jobs
            .get(&job.id())
            .is_some_and(|live| std::ptr::eq(live.value().as_ref(), job));
        if !owned {
            return Err(RegistryError::NotFound(job.id()));
        }
        if !job.mark_released() {
            return Err(RegistryError::AlreadyReleased(job.id()));
        }

        // El ID sale de los reservados antes que de los vivos: un `register`
        // concurrente con el mismo ID ve el duplicado y deshace su reserva
        self.ids.remove(&job.id());
        self.jobs
            .remove_if(&job.id(), |_, live| std::ptr::eq(live.as_ref(), job));
        self.by_thread
            .remove_if(&job.owner(), |_, live| std::ptr::eq(live.as_ref(), job));

        if let Some(user_id) = job.user_id() {
            if let Entry::Occupied(mut entry) = self.running_by_user.entry(user_id.to_string()) {
                let remaining = {
                    let count = entry.get_mut();
                    *count = count.saturating_sub(1);
                    *count
                };
                if remaining == 0 {
                    entry.remove();
                }
            }
        }

        self.stats.record_released();
        debug!(job = %job.id(), status = job.status().as_str(), "job released");
        Ok(())
    }
}

/// Registro de jobs. Clonarlo es barato: todas las copias comparten estado.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    state: Arc<RegistryState>,
}

impl JobRegistry {
    /// Crea un registro independiente
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            state: Arc::new(RegistryState {
                jobs: DashMap::new(),
                by_thread: DashMap::new(),
                running_by_user: DashMap::new(),
                ids: DashSet::new(),
                next_id: AtomicU64::new(1),
                config,
                stats: RegistryStats::new(),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.state.config
    }

    pub fn max_jobs_per_user(&self) -> Option<usize> {
        self.state.config.max_jobs_per_user
    }

    // ==================== IDs ====================

    /// Reserva un ID libre para registrar un job más tarde.
    ///
    /// Los IDs salen de un contador atómico; si un candidato ya está reservado
    /// o vivo (p. ej. registrado con un ID externo) se prueba el siguiente.
    pub fn reserve_id(&self) -> Result<JobId, RegistryError> {
        let attempts = self.state.config.max_id_attempts;

        for _ in 0..attempts {
            let candidate = JobId::new(self.state.next_id.fetch_add(1, Ordering::Relaxed));
            if self.state.jobs.contains_key(&candidate) {
                continue;
            }
            if self.state.ids.insert(candidate) {
                return Ok(candidate);
            }
        }

        self.state.stats.record_id_exhausted();
        error!("could not reserve a job id after {} attempts", attempts);
        Err(RegistryError::IdGenerationExhausted { attempts })
    }

    /// Libera una reserva que nunca se usó. No toca IDs de jobs vivos.
    pub fn unreserve_id(&self, id: JobId) -> bool {
        if self.state.jobs.contains_key(&id) {
            return false;
        }
        self.state.ids.remove(&id).is_some()
    }

    pub fn is_reserved(&self, id: JobId) -> bool {
        self.state.ids.contains(&id)
    }

    // ==================== Registro ====================

    /// Registra un job nuevo asociado al thread actual.
    ///
    /// Falla con `DuplicateId` si el ID está vivo, con `AlreadyWorking` si el
    /// thread ya tiene un job vivo y con `TooManyJobs` si el usuario alcanzó
    /// su límite. En cualquier fallo no queda nada registrado.
    pub fn register(
        &self,
        id: JobId,
        user_id: Option<&str>,
        name: impl Into<String>,
        task_count: usize,
    ) -> Result<Arc<Job>, RegistryError> {
        let state = &self.state;
        let thread = thread::current().id();
        let job = Arc::new(Job::new(
            id,
            user_id.map(str::to_string),
            name.into(),
            task_count,
            thread,
            Arc::downgrade(state),
        ));

        // El ID entra al conjunto de reservados antes de quedar vivo, así
        // `reserve_id` no puede entregarlo mientras se registra
        let newly_reserved = state.ids.insert(id);

        match state.jobs.entry(id) {
            Entry::Occupied(_) => {
                if newly_reserved {
                    state.ids.remove(&id);
                }
                return Err(state.reject(Rejection::DuplicateId, RegistryError::DuplicateId(id)));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&job));
            }
        }

        let current = match state.by_thread.entry(thread) {
            Entry::Occupied(entry) => Some(entry.get().id()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&job));
                None
            }
        };
        if let Some(current) = current {
            state.jobs.remove(&id);
            if newly_reserved {
                state.ids.remove(&id);
            }
            return Err(state.reject(
                Rejection::AlreadyWorking,
                RegistryError::AlreadyWorking { thread, current },
            ));
        }

        if let Some(user_id) = user_id {
            let accepted = {
                let mut count = state.running_by_user.entry(user_id.to_string()).or_insert(0);
                match state.config.max_jobs_per_user {
                    Some(max) if *count >= max => false,
                    _ => {
                        *count += 1;
                        true
                    }
                }
            };

            if !accepted {
                state.by_thread.remove_if(&thread, |_, live| Arc::ptr_eq(live, &job));
                state.jobs.remove_if(&id, |_, live| Arc::ptr_eq(live, &job));
                if newly_reserved {
                    state.ids.remove(&id);
                }
                let max = state.config.max_jobs_per_user.unwrap_or_default();
                return Err(state.reject(
                    Rejection::TooManyJobs,
                    RegistryError::TooManyJobs {
                        user_id: user_id.to_string(),
                        max,
                    },
                ));
            }
        }

        state.stats.record_registered();
        debug!(job = %id, user = user_id.unwrap_or("-"), tasks = task_count, "job registered");
        Ok(job)
    }

    /// Reserva un ID y registra el job en un solo paso
    pub fn register_new(
        &self,
        user_id: Option<&str>,
        name: impl Into<String>,
        task_count: usize,
    ) -> Result<Arc<Job>, RegistryError> {
        let id = self.reserve_id()?;
        self.register(id, user_id, name, task_count).map_err(|e| {
            self.unreserve_id(id);
            e
        })
    }

    /// Libera un job terminado y lo quita de todos los mapas
    pub fn release(&self, job: &Job) -> Result<(), RegistryError> {
        self.state.release(job)
    }

    // ==================== Consultas ====================

    pub fn lookup(&self, id: JobId) -> Option<Arc<Job>> {
        self.state.jobs.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Job vivo del thread actual, si tiene uno
    pub fn lookup_for_current_thread(&self) -> Option<Arc<Job>> {
        self.state
            .by_thread
            .get(&thread::current().id())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Pide la interrupción del job con ese ID
    pub fn interrupt(&self, id: JobId) -> Result<(), RegistryError> {
        let job = self.lookup(id).ok_or(RegistryError::NotFound(id))?;
        job.interrupt();
        self.state.stats.record_interrupt();
        Ok(())
    }

    /// Snapshots de todos los jobs vivos, ordenados por ID
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        let live: Vec<Arc<Job>> = self
            .state
            .jobs
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut snapshots: Vec<JobSnapshot> = live.iter().map(|job| job.snapshot()).collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    pub fn jobs_for_user(&self, user_id: &str) -> Vec<JobSnapshot> {
        self.jobs()
            .into_iter()
            .filter(|snapshot| snapshot.user_id.as_deref() == Some(user_id))
            .collect()
    }

    /// Jobs vivos del usuario según el contador
    pub fn running_count_for_user(&self, user_id: &str) -> usize {
        self.state
            .running_by_user
            .get(user_id)
            .map(|count| *count.value())
            .unwrap_or(0)
    }

    pub fn live_count(&self) -> usize {
        self.state.jobs.len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::error::JobError;
    use crate::jobs::types::JobStatus;

    fn registry_with_cap(max: usize) -> JobRegistry {
        JobRegistry::new(RegistryConfig::default().with_max_jobs_per_user(max))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = JobRegistry::default();
        let job = registry
            .register(JobId::new(1001), Some("alice"), "top anat", 3)
            .unwrap();

        assert_eq!(job.id(), JobId::new(1001));
        assert_eq!(job.owner(), thread::current().id());
        assert_eq!(registry.live_count(), 1);
        assert!(registry.is_reserved(JobId::new(1001)));

        let found = registry.lookup(JobId::new(1001)).unwrap();
        assert!(Arc::ptr_eq(&found, &job));

        let mine = registry.lookup_for_current_thread().unwrap();
        assert!(Arc::ptr_eq(&mine, &job));
        assert_eq!(registry.running_count_for_user("alice"), 1);

        job.complete_with_success();
        job.release();
    }

    // ==================== Rechazos ====================

    #[test]
    fn test_duplicate_id() {
        let registry = JobRegistry::default();
        let job = registry.register(JobId::new(7), None, "first", 1).unwrap();

        let other = registry.clone();
        let result = thread::spawn(move || {
            other
                .register(JobId::new(7), None, "second", 1)
                .map(|job| job.id())
        })
        .join()
        .unwrap();

        assert_eq!(result, Err(RegistryError::DuplicateId(JobId::new(7))));
        assert_eq!(registry.stats().rejected_duplicate_id, 1);

        job.release();
    }

    #[test]
    fn test_already_working() {
        let registry = JobRegistry::default();
        let job = registry.register(JobId::new(1), Some("bob"), "first", 1).unwrap();

        let err = registry
            .register(JobId::new(2), Some("bob"), "second", 1)
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyWorking {
                thread: thread::current().id(),
                current: JobId::new(1),
            }
        );

        // Rollback completo
        assert!(registry.lookup(JobId::new(2)).is_none());
        assert_eq!(registry.running_count_for_user("bob"), 1);
        assert!(Arc::ptr_eq(&registry.lookup_for_current_thread().unwrap(), &job));

        job.release();
        assert!(registry.lookup_for_current_thread().is_none());
    }

    #[test]
    fn test_too_many_jobs_scenario() {
        let registry = registry_with_cap(1);
        let job = registry
            .register(JobId::new(1001), Some("alice"), "analysis", 2)
            .unwrap();

        let other = registry.clone();
        let result = thread::spawn(move || {
            other
                .register(JobId::new(1002), Some("alice"), "analysis", 2)
                .map(|job| job.id())
        })
        .join()
        .unwrap();

        assert_eq!(
            result,
            Err(RegistryError::TooManyJobs {
                user_id: "alice".to_string(),
                max: 1
            })
        );
        assert!(registry.lookup(JobId::new(1002)).is_none());
        assert_eq!(registry.running_count_for_user("alice"), 1);

        job.complete_with_success();
        job.release();
        assert_eq!(registry.running_count_for_user("alice"), 0);

        let job = registry
            .register(JobId::new(1002), Some("alice"), "analysis", 2)
            .unwrap();
        assert_eq!(registry.running_count_for_user("alice"), 1);
        job.release();
    }

    #[test]
    fn test_too_many_jobs_rolls_back_thread_mapping() {
        let registry = registry_with_cap(1);

        let holder = registry.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let job = holder.register(JobId::new(1), Some("carol"), "long", 1).unwrap();
            tx.send(()).unwrap();
            done_rx.recv().unwrap();
            job.release();
        });
        rx.recv().unwrap();

        assert!(registry
            .register(JobId::new(2), Some("carol"), "extra", 1)
            .is_err());
        // El thread actual no quedó ocupado
        assert!(registry.lookup_for_current_thread().is_none());

        let job = registry.register(JobId::new(3), Some("dave"), "other user", 1).unwrap();
        job.release();

        done_tx.send(()).unwrap();
        handle.join().unwrap();
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_unlimited_without_user() {
        let registry = registry_with_cap(1);
        let job = registry.register(JobId::new(1), None, "anonymous", 1).unwrap();
        assert_eq!(registry.running_count_for_user(""), 0);
        job.release();
    }

    // ==================== IDs ====================

    #[test]
    fn test_reserve_id_is_unique() {
        let registry = JobRegistry::default();
        let a = registry.reserve_id().unwrap();
        let b = registry.reserve_id().unwrap();

        assert_ne!(a, b);
        assert!(registry.is_reserved(a));
        assert!(registry.unreserve_id(a));
        assert!(!registry.is_reserved(a));
        assert!(!registry.unreserve_id(a));
    }

    #[test]
    fn test_reserve_id_skips_live_ids() {
        let registry = JobRegistry::default();
        let job = registry.register(JobId::new(1), None, "external id", 1).unwrap();

        let reserved = registry.reserve_id().unwrap();
        assert_ne!(reserved, JobId::new(1));

        job.release();
    }

    #[test]
    fn test_reserve_id_exhausted() {
        let registry = JobRegistry::new(RegistryConfig::default().with_max_id_attempts(3));

        // Ocupar los tres candidatos que el contador va a proponer
        let holders: Vec<_> = (1..=3)
            .map(|id| {
                let registry = registry.clone();
                thread::spawn(move || {
                    registry
                        .register(JobId::new(id), None, "blocker", 1)
                        .map(|job| job.id())
                })
                .join()
                .unwrap()
                .unwrap()
            })
            .collect();
        assert_eq!(holders.len(), 3);

        let err = registry.reserve_id().unwrap_err();
        assert_eq!(err, RegistryError::IdGenerationExhausted { attempts: 3 });
        assert!(!err.is_recoverable());
        assert_eq!(registry.stats().id_exhausted, 1);

        // El contador siguió avanzando
        assert_eq!(registry.reserve_id().unwrap(), JobId::new(4));
    }

    #[test]
    fn test_register_new_unreserves_on_failure() {
        let registry = JobRegistry::default();
        let job = registry.register_new(Some("erin"), "first", 1).unwrap();

        let err = registry.register_new(Some("erin"), "second", 1).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyWorking { .. }));

        // Solo queda el ID del job vivo
        let snapshot = registry.jobs();
        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_reserved(job.id()));
        assert!(!registry.is_reserved(JobId::new(job.id().as_u64() + 1)));

        job.release();
        assert!(!registry.is_reserved(job.id()));
    }

    // ==================== Liberación ====================

    #[test]
    fn test_release_requires_termination() {
        let registry = JobRegistry::default();
        let job = registry.register(JobId::new(5), Some("frank"), "job", 1).unwrap();

        assert_eq!(registry.release(&job), Err(RegistryError::NotTerminated(JobId::new(5))));
        assert_eq!(registry.live_count(), 1);

        job.complete_with_success();
        assert!(registry.release(&job).is_ok());
        assert_eq!(registry.release(&job), Err(RegistryError::AlreadyReleased(JobId::new(5))));

        assert!(job.is_released());
        assert!(job.is_successful());
        assert!(registry.lookup(JobId::new(5)).is_none());
        assert!(registry.lookup_for_current_thread().is_none());
        assert_eq!(registry.running_count_for_user("frank"), 0);
    }

    #[test]
    fn test_job_release_twice() {
        let registry = JobRegistry::default();
        let job = registry.register(JobId::new(9), None, "job", 1).unwrap();

        job.release();
        job.release();

        assert!(job.is_released());
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(registry.stats().released, 1);
        assert!(!registry.is_reserved(JobId::new(9)));
    }

    #[test]
    fn test_release_after_registry_dropped() {
        let registry = JobRegistry::default();
        let job = registry.register(JobId::new(1), None, "orphan", 1).unwrap();
        drop(registry);

        job.release();
        assert!(job.is_released());
    }

    #[test]
    fn test_release_through_other_registry() {
        let a = registry_with_cap(1);
        let b = registry_with_cap(1);

        let job = a.register(JobId::new(1), Some("alice"), "in a", 1).unwrap();
        let b_job = {
            let b = b.clone();
            thread::spawn(move || b.register(JobId::new(1), Some("alice"), "in b", 1).unwrap())
                .join()
                .unwrap()
        };

        job.complete_with_success();
        assert_eq!(b.release(&job), Err(RegistryError::NotFound(JobId::new(1))));

        // Nada cambió en ninguno de los dos registros
        assert!(!job.is_released());
        assert_eq!(a.live_count(), 1);
        assert_eq!(b.live_count(), 1);
        assert_eq!(b.running_count_for_user("alice"), 1);
        assert!(b.is_reserved(JobId::new(1)));
        assert_eq!(b.stats().released, 0);

        // El dueño real todavía puede liberarlo
        job.release();
        assert!(job.is_released());
        assert_eq!(a.live_count(), 0);
        assert_eq!(a.running_count_for_user("alice"), 0);

        let again = a.register(JobId::new(2), Some("alice"), "in a again", 1).unwrap();
        again.release();

        b_job.complete();
        assert!(b.release(&b_job).is_ok());
        assert_eq!(b.live_count(), 0);
    }

    #[test]
    fn test_failed_registration_undoes_its_reservation() {
        let registry = registry_with_cap(1);
        let job = registry.register(JobId::new(1), Some("ivan"), "running", 1).unwrap();
        assert!(registry.is_reserved(JobId::new(1)));

        // ID externo nuevo: la reserva que hizo el registro se deshace
        assert!(registry.register(JobId::new(50), Some("ivan"), "busy", 1).is_err());
        assert!(!registry.is_reserved(JobId::new(50)));

        // ID reservado antes: la reserva del que llama se conserva
        let reserved = registry.reserve_id().unwrap();
        assert!(registry.register(reserved, Some("ivan"), "busy", 1).is_err());
        assert!(registry.is_reserved(reserved));

        // Límite por usuario desde otro thread
        let other = registry.clone();
        let result = thread::spawn(move || {
            other
                .register(JobId::new(60), Some("ivan"), "over the cap", 1)
                .map(|job| job.id())
        })
        .join()
        .unwrap();
        assert!(matches!(result, Err(RegistryError::TooManyJobs { .. })));
        assert!(!registry.is_reserved(JobId::new(60)));

        job.release();
        assert!(registry.unreserve_id(reserved));
    }

    // ==================== Interrupción ====================

    #[test]
    fn test_interrupt_by_id() {
        let registry = JobRegistry::default();
        let job = registry.register(JobId::new(3), None, "job", 2).unwrap();
        job.start_job();

        assert_eq!(
            registry.interrupt(JobId::new(99)),
            Err(RegistryError::NotFound(JobId::new(99)))
        );
        registry.interrupt(JobId::new(3)).unwrap();

        assert!(job.is_interrupt_requested());
        assert_eq!(job.check_interrupted(), Err(JobError::Interrupted(JobId::new(3))));
        assert_eq!(registry.stats().interrupts, 1);

        job.release();
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_jobs_for_user() {
        let registry = JobRegistry::default();
        let mine = registry.register(JobId::new(10), Some("gina"), "a", 1).unwrap();

        let other = registry.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            let job = other.register(JobId::new(11), Some("hank"), "b", 1).unwrap();
            tx.send(()).unwrap();
            done_rx.recv().unwrap();
            job.release();
        });
        rx.recv().unwrap();

        let all = registry.jobs();
        assert_eq!(all.iter().map(|s| s.id.as_u64()).collect::<Vec<_>>(), vec![10, 11]);

        let gina = registry.jobs_for_user("gina");
        assert_eq!(gina.len(), 1);
        assert_eq!(gina[0].name, "a");

        done_tx.send(()).unwrap();
        handle.join().unwrap();
        mine.release();
        assert!(registry.jobs().is_empty());
    }
}
