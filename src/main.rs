//! # Job Registry - Entry Point
//! src/main.rs
//!
//! Parsea la configuración, inicializa el logging y ejecuta la carga de
//! demostración sobre un registro nuevo.

use job_registry::config::Config;
use job_registry::jobs::{JobRegistry, RegistryConfig};
use job_registry::workload::{self, WorkloadConfig};
use tracing_subscriber::EnvFilter;

fn main() {
    println!("=================================");
    println!("  Job Registry");
    println!("=================================\n");

    let config = Config::new();

    if let Err(e) = config.validate() {
        eprintln!("💥 Configuración inválida: {}", e);
        std::process::exit(1);
    }

    // RUST_LOG tiene prioridad sobre --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.print_summary();

    let registry = JobRegistry::new(RegistryConfig::from_config(&config));
    let report = workload::run(&WorkloadConfig::from_config(&config), &registry);

    println!("📊 Workload:");
    println!("{}", report.to_json());
    println!();
    println!("📈 Registry:");
    println!("{}", registry.stats().to_json());

    if registry.live_count() > 0 {
        eprintln!("💥 {} jobs were never released", registry.live_count());
        std::process::exit(1);
    }
}
