//! # Collector de Métricas del Registro
//! src/metrics/collector.rs
//!
//! Contadores atómicos de lo que pasa en el registro de jobs: registros
//! aceptados, rechazos por tipo, liberaciones e interrupciones.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Motivo por el que se rechazó un registro
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DuplicateId,
    AlreadyWorking,
    TooManyJobs,
}

/// Collector de métricas thread-safe
#[derive(Debug)]
pub struct RegistryStats {
    registered: AtomicU64,
    released: AtomicU64,
    interrupts: AtomicU64,
    rejected_duplicate_id: AtomicU64,
    rejected_already_working: AtomicU64,
    rejected_too_many_jobs: AtomicU64,
    id_exhausted: AtomicU64,
    start_time: Instant,
}

/// Snapshot de las métricas en un instante dado
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub registered: u64,
    pub released: u64,
    pub interrupts: u64,
    pub rejected_duplicate_id: u64,
    pub rejected_already_working: u64,
    pub rejected_too_many_jobs: u64,
    pub id_exhausted: u64,
}

impl StatsSnapshot {
    /// Jobs registrados y todavía no liberados
    pub fn live(&self) -> u64 {
        self.registered.saturating_sub(self.released)
    }

    pub fn total_rejected(&self) -> u64 {
        self.rejected_duplicate_id + self.rejected_already_working + self.rejected_too_many_jobs
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl RegistryStats {
    pub fn new() -> Self {
        Self {
            registered: AtomicU64::new(0),
            released: AtomicU64::new(0),
            interrupts: AtomicU64::new(0),
            rejected_duplicate_id: AtomicU64::new(0),
            rejected_already_working: AtomicU64::new(0),
            rejected_too_many_jobs: AtomicU64::new(0),
            id_exhausted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_registered(&self) {
        self.registered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, rejection: Rejection) {
        let counter = match rejection {
            Rejection::DuplicateId => &self.rejected_duplicate_id,
            Rejection::AlreadyWorking => &self.rejected_already_working,
            Rejection::TooManyJobs => &self.rejected_too_many_jobs,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_id_exhausted(&self) {
        self.id_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Obtiene un snapshot de las métricas
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            registered: self.registered.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            interrupts: self.interrupts.load(Ordering::Relaxed),
            rejected_duplicate_id: self.rejected_duplicate_id.load(Ordering::Relaxed),
            rejected_already_working: self.rejected_already_working.load(Ordering::Relaxed),
            rejected_too_many_jobs: self.rejected_too_many_jobs.load(Ordering::Relaxed),
            id_exhausted: self.id_exhausted.load(Ordering::Relaxed),
        }
    }
}

impl Default for RegistryStats {
    fn default() -> Self {
        Self::new()
    }
}
