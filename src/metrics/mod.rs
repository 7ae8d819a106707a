//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Este módulo implementa la recolección de métricas del registro de jobs:
//! - Jobs registrados y liberados
//! - Rechazos (ID duplicado, thread ocupado, límite por usuario)
//! - Interrupciones pedidas

pub mod collector;

pub use collector::{Rejection, RegistryStats, StatsSnapshot};
