//! # Token de Cancelación Cooperativa
//! src/jobs/cancel.rs
//!
//! Flag compartido entre un job y el thread que lo ejecuta. Quien quiere
//! interrumpir llama `cancel()`; el worker consulta `is_cancelled()` en puntos
//! seguros o espera con `wait_timeout()`, que despierta apenas se cancela.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct TokenState {
    cancelled: AtomicBool,

    /// Mutex + Condvar para despertar a quien espera en `wait_timeout`
    lock: Mutex<()>,
    condvar: Condvar,
}

/// Token de cancelación clonable (todas las copias comparten el estado)
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                lock: Mutex::new(()),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Marca el token como cancelado y despierta a los que esperan.
    ///
    /// Retorna `true` solo para la primera llamada.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::AcqRel);
        // Tomar el lock evita perder la notificación entre el chequeo y el wait
        let _guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        self.inner.condvar.notify_all();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Espera hasta `timeout` o hasta que el token se cancele.
    ///
    /// Retorna `true` si el token quedó cancelado.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self
            .inner
            .lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        loop {
            if self.is_cancelled() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.inner.condvar.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
