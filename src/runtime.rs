//! Process-wide runtime
//!
//! The single registry shared by the whole process, with its periodic
//! flush task. Created lazily on first use (or explicitly with [`init`])
//! and torn down explicitly with [`shutdown`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::registry::Registry;
use crate::scheduler::FlushTask;

static RUNTIME: Mutex<Option<Runtime>> = Mutex::new(None);

struct Runtime {
    registry: Arc<Registry>,
    flusher: Option<FlushTask>,
}

impl Runtime {
    fn start(config: &Config) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(Registry::new(config));
        let flusher = match FlushTask::spawn(Arc::downgrade(&registry), config.flush_interval) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(error = %e, "failed to start flush task; groups sync only on drop");
                None
            }
        };

        info!(data_dir = %config.data_dir.display(), "seencache runtime started");
        Ok(Self { registry, flusher })
    }
}

/// Start the runtime with `config`
///
/// If the runtime is already running, its registry is returned and
/// `config` is ignored.
pub fn init(config: &Config) -> Result<Arc<Registry>> {
    let mut runtime = RUNTIME.lock();
    if let Some(running) = runtime.as_ref() {
        return Ok(Arc::clone(&running.registry));
    }
    let started = Runtime::start(config)?;
    let registry = Arc::clone(&started.registry);
    *runtime = Some(started);
    Ok(registry)
}

/// The process-wide registry, started with the default config if needed
pub fn registry() -> Result<Arc<Registry>> {
    init(&Config::default())
}

pub fn is_running() -> bool {
    RUNTIME.lock().is_some()
}

/// Cancel the flush task, sync every live group and release the registry
///
/// Groups still held by callers stay usable; they sync again when their
/// last handle is dropped.
pub fn shutdown() {
    let Some(mut runtime) = RUNTIME.lock().take() else {
        return;
    };

    if let Some(flusher) = runtime.flusher.take() {
        flusher.cancel();
    }
    let synced = runtime.registry.flush_all();
    info!(groups = synced, "seencache runtime stopped");
}
