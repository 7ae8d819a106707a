//! # Configuración
//! src/config.rs
//!
//! Configuración del registro de jobs y de la carga de demostración, con
//! soporte para argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./job_registry --max-jobs-per-user 2 \
//!   --workers 8 \
//!   --users 3 \
//!   --tasks 5 \
//!   --interrupt-every 4
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! JOBS_MAX_PER_USER=1 WORKERS=4 ./job_registry
//! ```

use clap::Parser;

/// Configuración del registro de jobs
#[derive(Debug, Clone, Parser)]
#[command(name = "job_registry")]
#[command(about = "Registro concurrente de jobs interrumpibles")]
#[command(version = "0.1.0")]
pub struct Config {
    // === Registro ===

    /// Máximo de jobs simultáneos por usuario (0 = sin límite)
    #[arg(long = "max-jobs-per-user", default_value = "0", env = "JOBS_MAX_PER_USER")]
    pub max_jobs_per_user: usize,

    /// Intentos para encontrar un ID de job libre
    #[arg(long = "max-id-attempts", default_value = "16", env = "JOBS_MAX_ID_ATTEMPTS")]
    pub max_id_attempts: u32,

    // === Carga de demostración ===

    /// Número de threads worker (cada uno ejecuta un job)
    #[arg(long, default_value = "4", env = "WORKERS")]
    pub workers: usize,

    /// Número de usuarios entre los que se reparten los workers
    #[arg(long, default_value = "2", env = "USERS")]
    pub users: usize,

    /// Sub-tareas por job
    #[arg(long, default_value = "5", env = "TASKS")]
    pub tasks: usize,

    /// Duración de cada sub-tarea en milisegundos
    #[arg(long = "task-ms", default_value = "50", env = "TASK_MS")]
    pub task_ms: u64,

    /// Interrumpir uno de cada N jobs (0 = nunca)
    #[arg(long = "interrupt-every", default_value = "3", env = "INTERRUPT_EVERY")]
    pub interrupt_every: usize,

    // === Logging ===

    /// Nivel de log cuando RUST_LOG no está definido
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.max_id_attempts == 0 {
            return Err("Max id attempts must be >= 1".to_string());
        }

        if self.workers == 0 {
            return Err("Workers must be >= 1".to_string());
        }
        if self.users == 0 {
            return Err("Users must be >= 1".to_string());
        }
        if self.tasks == 0 {
            return Err("Tasks must be >= 1".to_string());
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(format!("Unknown log level: {}", other)),
        }
    }

    /// Imprime un resumen de la configuración
    pub fn print_summary(&self) {
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║                Job Registry Configuration                    ║");
        println!("╚══════════════════════════════════════════════════════════════╝");
        println!();
        println!("📋 Registry:");
        if self.max_jobs_per_user > 0 {
            println!("   Max per user: {} jobs", self.max_jobs_per_user);
        } else {
            println!("   Max per user: unlimited");
        }
        println!("   Id attempts:  {}", self.max_id_attempts);
        println!();
        println!("👷 Workload:");
        println!("   Workers:      {}", self.workers);
        println!("   Users:        {}", self.users);
        println!("   Tasks/job:    {} x {} ms", self.tasks, self.task_ms);
        if self.interrupt_every > 0 {
            println!("   Interrupts:   1 of every {} jobs", self.interrupt_every);
        } else {
            println!("   Interrupts:   disabled");
        }
        println!();
        println!("═══════════════════════════════════════════════════════════════");
        println!();
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            max_jobs_per_user: 0,
            max_id_attempts: 16,
            workers: 4,
            users: 2,
            tasks: 5,
            task_ms: 50,
            interrupt_every: 3,
            log_level: "info".to_string(),
        }
    }
}
