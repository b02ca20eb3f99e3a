// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use serde::{Deserialize, Serialize};

/// Persistent application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Largest side (in pixels) the enhancement pipeline works at before
    /// downscaling for speed.
    pub max_processing_dimension: u32,
    /// Local window size used when a job does not specify one.
    pub default_window_size: u32,
    /// Apply the large-image optimisation policy to every job, not only
    /// to images above one megapixel.
    pub performance_optimizations: bool,
    /// Tasks older than this are evicted by the reaper.
    pub task_retention_secs: u64,
    /// How often the reaper runs.
    pub reaper_interval_secs: u64,
    /// Maximum number of decoded images kept in the cache.
    pub image_cache_capacity: usize,
    /// Number of history entries returned by default.
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_processing_dimension: 1200,
            default_window_size: 15,
            performance_optimizations: true,
            task_retention_secs: 3600,
            reaper_interval_secs: 300,
            image_cache_capacity: 50,
            history_limit: 20,
        }
    }
}
