// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Processing history: a JSON-backed log of completed runs.
//
// Layout on disk:
//   <history_dir>/history.json   -- array of HistoryEntry, oldest first
//   <results_dir>/<result_name>  -- the PNG written for each entry

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use kontrast_core::error::{KontrastError, Result};
use kontrast_core::{HistoryEntry, ParameterBag};
use kontrast_imaging::{MorphologyOp, PixelBuffer, codec};
use tracing::{debug, info, instrument, warn};

use crate::jobs::JobKind;

// ---------------------------------------------------------------------------
// Sink trait
// ---------------------------------------------------------------------------

/// What a finished task hands to the history log.
#[derive(Debug, Clone, Copy)]
pub struct CompletedRun<'a> {
    pub kind: JobKind,
    pub source_name: &'a str,
    pub result_name: &'a str,
    pub params: &'a ParameterBag,
    pub result: &'a PixelBuffer,
}

/// Destination for completed runs. Failures are reported but never change
/// the outcome of the task that produced the run.
pub trait HistorySink: Send + Sync {
    fn record(&self, run: &CompletedRun<'_>) -> Result<HistoryEntry>;
}

/// Discards every run.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHistory;

impl HistorySink for NullHistory {
    fn record(&self, run: &CompletedRun<'_>) -> Result<HistoryEntry> {
        Ok(HistoryEntry {
            id: String::new(),
            timestamp: Utc::now(),
            source_name: run.source_name.to_string(),
            result_name: run.result_name.to_string(),
            descriptive_name: descriptive_name(run.kind, run.params),
            params: run.params.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// JSON-backed log
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct State {
    entries: Vec<HistoryEntry>,
    last_id: i64,
}

/// History persisted as a JSON file next to a directory of result images.
#[derive(Debug)]
pub struct JsonHistory {
    history_file: PathBuf,
    results_dir: PathBuf,
    state: Mutex<State>,
}

fn history_err(e: impl std::fmt::Display) -> KontrastError {
    KontrastError::History(e.to_string())
}

impl JsonHistory {
    /// Open (or create) the log. An unreadable `history.json` is logged and
    /// treated as empty.
    #[instrument(skip_all, fields(dir = %history_dir.as_ref().display()))]
    pub fn open(history_dir: impl AsRef<Path>, results_dir: impl AsRef<Path>) -> Result<Self> {
        let history_dir = history_dir.as_ref();
        let results_dir = results_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(history_dir)?;
        std::fs::create_dir_all(&results_dir)?;

        let history_file = history_dir.join("history.json");
        let entries = match std::fs::read(&history_file) {
            Ok(bytes) => serde_json::from_slice::<Vec<HistoryEntry>>(&bytes).unwrap_or_else(|e| {
                warn!(error = %e, "history.json unreadable, starting empty");
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let last_id = entries
            .iter()
            .filter_map(|e| e.id.parse::<i64>().ok())
            .max()
            .unwrap_or(0);

        info!(entries = entries.len(), "history opened");
        Ok(Self {
            history_file,
            results_dir,
            state: Mutex::new(State { entries, last_id }),
        })
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Full path of a stored result.
    pub fn result_path(&self, result_name: &str) -> PathBuf {
        self.results_dir.join(result_name)
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let state = self.lock()?;
        let mut entries = state.entries.clone();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        entries.truncate(limit);
        Ok(entries)
    }

    pub fn get(&self, id: &str) -> Result<Option<HistoryEntry>> {
        Ok(self.lock()?.entries.iter().find(|e| e.id == id).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    /// Remove an entry and its result image. Returns false if `id` is unknown.
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let Some(pos) = state.entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };
        let entry = state.entries.remove(pos);
        self.remove_result(&entry.result_name);
        self.persist(&state.entries)?;
        debug!(id, "history entry deleted");
        Ok(true)
    }

    /// Remove every entry and its result image. Returns how many were removed.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let removed = std::mem::take(&mut state.entries);
        for entry in &removed {
            self.remove_result(&entry.result_name);
        }
        self.persist(&state.entries)?;
        info!(count = removed.len(), "history cleared");
        Ok(removed.len())
    }

    /// `wanted`, or `wanted` with a `_<n>` suffix if an entry or a file
    /// already owns that name.
    fn free_name(&self, entries: &[HistoryEntry], wanted: &str) -> String {
        let taken = |name: &str| {
            entries.iter().any(|e| e.result_name == name) || self.result_path(name).exists()
        };
        if !taken(wanted) {
            return wanted.to_string();
        }
        let (stem, ext) = wanted.rsplit_once('.').unwrap_or((wanted, "png"));
        (1u32..)
            .map(|n| format!("{stem}_{n}.{ext}"))
            .find(|name| !taken(name))
            .unwrap_or_else(|| wanted.to_string())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| history_err("history lock poisoned"))
    }

    fn remove_result(&self, result_name: &str) {
        let path = self.result_path(result_name);
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "could not remove result file"),
        }
    }

    /// Write through a temporary file so a crash never leaves half a log.
    fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.history_file.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.history_file)?;
        Ok(())
    }
}

impl HistorySink for JsonHistory {
    #[instrument(skip_all, fields(result = run.result_name))]
    fn record(&self, run: &CompletedRun<'_>) -> Result<HistoryEntry> {
        let mut state = self.lock()?;
        let result_name = self.free_name(&state.entries, run.result_name);
        codec::save(run.result, self.result_path(&result_name))
            .map_err(|e| history_err(format!("writing {result_name}: {e}")))?;

        let now = Utc::now();
        // Millisecond ids, bumped when two runs land in the same millisecond.
        let id = now.timestamp_millis().max(state.last_id + 1);
        state.last_id = id;

        let entry = HistoryEntry {
            id: id.to_string(),
            timestamp: now,
            source_name: run.source_name.to_string(),
            result_name,
            descriptive_name: descriptive_name(run.kind, run.params),
            params: run.params.clone(),
        };
        state.entries.push(entry.clone());
        if let Err(e) = self.persist(&state.entries) {
            state.entries.pop();
            self.remove_result(&entry.result_name);
            return Err(history_err(e));
        }
        info!(id = %entry.id, name = %entry.descriptive_name, "history entry recorded");
        Ok(entry)
    }
}

/// Short label built from the parameters that shaped a run.
pub fn descriptive_name(kind: JobKind, params: &ParameterBag) -> String {
    if let Some(preset) = params.text("preset").filter(|p| !p.is_empty()) {
        return format!("preset_{preset}");
    }
    match kind {
        JobKind::Morphology(MorphologyOp::HitOrMiss) => {
            let pattern = params.text("pattern").unwrap_or_else(|| "cross".into());
            return format!("morphological_hit_or_miss_{pattern}");
        }
        JobKind::Morphology(op) => return format!("morphological_{op}"),
        JobKind::Filter(filter) => return format!("filter_{filter}"),
        JobKind::Enhance => {}
    }

    let mut parts = Vec::new();
    if let Some(w) = params.number("window_size") {
        parts.push(format!("window_{w}"));
    }
    for (key, label) in [
        ("simplified_processing", "simplified"),
        ("enhance_details", "detail_enhanced"),
        ("apply_clahe", "clahe"),
        ("apply_high_boost", "high_boost"),
    ] {
        if params.flag(key) == Some(true) {
            parts.push(label.to_string());
        }
    }
    if parts.is_empty() {
        "adaptive_contrast_enhancement".to_string()
    } else {
        parts.join("_")
    }
}
