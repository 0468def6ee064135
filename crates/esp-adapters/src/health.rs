use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Process-wide engine health flag.
///
/// Shared by every publisher and subscriber created through the same
/// [`EspComponent`](crate::EspComponent). The flag only ever goes from up to
/// down; it is cleared by restarting the process (or creating a new
/// component).
#[derive(Debug, Default)]
pub struct EngineHealth {
    down: AtomicBool,
}

impl EngineHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the engine down flag. Further attempts to publish will fail.
    pub fn mark_down(&self) {
        if !self.down.swap(true, Ordering::AcqRel) {
            info!("engine down flag raised; further attempts to publish will fail");
        }
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::Acquire)
    }
}
