use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::OrganizerConfig;
use crate::services::audit_log::AuditLog;

/// Shared state handed to the presentation layer.
pub struct AppState {
    pub busy: Arc<AtomicBool>,
    pub audit: Arc<AuditLog>,
    pub config: Arc<OrganizerConfig>,
}

/// Clears the busy flag when the run that set it ends, even on panic.
pub struct RunGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl AppState {
    pub fn new(config: OrganizerConfig) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            audit: Arc::new(AuditLog::new(config.audit_log_capacity)),
            config: Arc::new(config),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// `None` when a run is already in progress.
    pub fn try_begin_run(&self) -> Option<RunGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                busy: self.busy.clone(),
            })
    }
}
