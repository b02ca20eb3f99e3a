// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer. Owns the decoded-image cache, the task orchestrator
// and the history log, and applies the persisted configuration to each job.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use kontrast_core::error::{KontrastError, Result};
use kontrast_core::{AppConfig, HistoryEntry, ParameterBag, TaskId};
use kontrast_imaging::{ImageCache, PixelBuffer, codec};
use kontrast_tasks::{
    JobKind, JsonHistory, OptimizationPolicy, TaskOrchestrator, TaskRequest, TaskView,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";

/// Built-in values the config can override. Config values equal to these are
/// not injected, so the optimisation policy is still free to lower them.
const BUILTIN_WINDOW_SIZE: u32 = 15;
const BUILTIN_PROCESSING_DIMENSION: u32 = 1200;

/// Shared application services. Cheap to clone.
#[derive(Clone)]
pub struct AppServices {
    data_dir: PathBuf,
    config: Arc<Mutex<AppConfig>>,
    cache: Arc<Mutex<ImageCache>>,
    history: Arc<JsonHistory>,
    orchestrator: TaskOrchestrator,
}

#[allow(dead_code)]
impl AppServices {
    /// Initialise all services in the default data directory.
    pub fn init(runtime: Handle) -> Result<Self> {
        Self::init_in(data_dir::data_dir(), runtime)
    }

    /// Initialise all services rooted at `dir`.
    pub fn init_in(dir: PathBuf, runtime: Handle) -> Result<Self> {
        info!(path = %dir.display(), "initialising app services");
        std::fs::create_dir_all(&dir)?;

        let config = load_config(&dir).unwrap_or_default();
        let history = Arc::new(JsonHistory::open(
            data_dir::subdir(&dir, "history"),
            data_dir::subdir(&dir, "results"),
        )?);
        let orchestrator = TaskOrchestrator::new(runtime, history.clone())
            .with_policy(OptimizationPolicy::new(config.performance_optimizations));

        info!("app services initialised");
        Ok(Self {
            data_dir: dir,
            cache: Arc::new(Mutex::new(ImageCache::new(config.image_cache_capacity))),
            config: Arc::new(Mutex::new(config)),
            history,
            orchestrator,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    // -- Jobs ----------------------------------------------------------------

    /// Decode `path` (through the cache) and start `kind` on it.
    pub fn submit(&self, path: &Path, kind: JobKind, params: ParameterBag) -> Result<TaskId> {
        let input = self.load_image(path)?;
        let params = if kind.is_enhancement() {
            with_config_defaults(params, &self.config())
        } else {
            params
        };
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        Ok(self.orchestrator.submit_job(TaskRequest {
            source_name,
            kind,
            input,
            params,
        }))
    }

    pub fn status(&self, id: TaskId) -> Result<TaskView> {
        self.orchestrator.status(id)
    }

    pub async fn wait(&self, id: TaskId, timeout: Duration) -> Result<TaskView> {
        self.orchestrator.wait(id, timeout).await
    }

    /// Start periodic eviction using the configured retention.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let config = self.config();
        self.orchestrator.spawn_reaper(
            Duration::from_secs(config.reaper_interval_secs),
            Duration::from_secs(config.task_retention_secs),
        )
    }

    // -- Image cache ---------------------------------------------------------

    pub fn load_image(&self, path: &Path) -> Result<PixelBuffer> {
        self.lock_cache()?.get_or_load(path)
    }

    pub fn clear_cache(&self) -> Result<()> {
        let mut cache = self.lock_cache()?;
        debug!(entries = cache.len(), "clearing image cache");
        cache.clear();
        Ok(())
    }

    fn lock_cache(&self) -> Result<MutexGuard<'_, ImageCache>> {
        self.cache
            .lock()
            .map_err(|_| KontrastError::InvalidInput("image cache lock poisoned".into()))
    }

    // -- History -------------------------------------------------------------

    /// Most recent entries, up to the configured limit.
    pub fn recent_history(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(self.config().history_limit);
        self.history.recent(limit)
    }

    pub fn delete_history(&self, id: &str) -> Result<bool> {
        self.history.delete(id)
    }

    pub fn clear_history(&self) -> Result<usize> {
        self.history.clear()
    }

    /// Where a completed task's image lives on disk. Results the history log
    /// did not accept are written on demand.
    pub fn result_path(&self, view: &TaskView) -> Result<Option<PathBuf>> {
        let Some(output) = &view.result else {
            return Ok(None);
        };
        let path = self.history.result_path(&output.result_name);
        if output.history_id.is_none() || !path.exists() {
            warn!(path = %path.display(), "result missing from history, writing directly");
            codec::save(&output.image, &path)?;
        }
        Ok(Some(path))
    }

    // -- Config --------------------------------------------------------------

    pub fn config(&self) -> AppConfig {
        match self.config.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        match self.config.lock() {
            Ok(mut guard) => *guard = config.clone(),
            Err(poisoned) => *poisoned.into_inner() = config.clone(),
        }
        persist_config(&self.data_dir, config)
    }
}

/// Fill in configured defaults the caller did not set.
fn with_config_defaults(mut params: ParameterBag, config: &AppConfig) -> ParameterBag {
    if !params.contains("window_size") && config.default_window_size != BUILTIN_WINDOW_SIZE {
        params.insert("window_size", config.default_window_size);
    }
    if !params.contains("max_processing_dimension")
        && config.max_processing_dimension != BUILTIN_PROCESSING_DIMENSION
    {
        params.insert("max_processing_dimension", config.max_processing_dimension);
    }
    params
}

fn load_config(data_dir: &Path) -> Option<AppConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "config unreadable, using defaults");
            None
        }
    }
}

fn persist_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kontrast_core::TaskStatus;
    use kontrast_imaging::{Channels, MorphologyOp};

    #[test]
    fn config_defaults_only_fill_gaps() {
        let config = AppConfig {
            default_window_size: 21,
            ..AppConfig::default()
        };
        let filled = with_config_defaults(ParameterBag::new(), &config);
        assert_eq!(filled.number("window_size"), Some(21.0));
        assert!(!filled.contains("max_processing_dimension"));

        let explicit = with_config_defaults(ParameterBag::new().with("window_size", 5.0), &config);
        assert_eq!(explicit.number("window_size"), Some(5.0));
    }

    #[test]
    fn config_round_trips_through_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            history_limit: 7,
            ..AppConfig::default()
        };
        persist_config(dir.path(), &config).expect("persist");
        assert_eq!(load_config(dir.path()).expect("load").history_limit, 7);

        std::fs::write(dir.path().join(CONFIG_FILE), "nonsense").expect("write");
        assert!(load_config(dir.path()).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_from_disk_records_history() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("square.png");
        let mut data = vec![0u8; 16 * 16];
        for y in 4..12 {
            for x in 4..12 {
                data[y * 16 + x] = 255;
            }
        }
        let buffer = PixelBuffer::new(16, 16, Channels::Gray, data).expect("buffer");
        codec::save(&buffer, &input).expect("save");

        let services =
            AppServices::init_in(dir.path().join("data"), Handle::current()).expect("init");
        let id = services
            .submit(
                &input,
                JobKind::Morphology(MorphologyOp::Thinning),
                ParameterBag::new(),
            )
            .expect("submit");
        let view = services.wait(id, Duration::from_secs(30)).await.expect("wait");
        assert_eq!(view.status, TaskStatus::Completed);

        let path = services.result_path(&view).expect("path").expect("some path");
        assert!(path.exists());
        assert_eq!(services.recent_history(None).expect("history").len(), 1);
        services.clear_cache().expect("clear");
    }
}
