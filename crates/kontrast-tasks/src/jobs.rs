// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The kinds of work a task can run, and how each one is executed.

use std::fmt;

use chrono::{DateTime, Utc};
use kontrast_core::error::Result;
use kontrast_core::{ParameterBag, TaskId};
use kontrast_imaging::{
    ColourFilter, EnhancementPipeline, FilterSettings, MorphologyOp, MorphologySettings,
    PixelBuffer, ProgressSink, apply_filter, apply_morphology,
};
use serde::{Deserialize, Serialize};

/// A unit of image work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "op")]
pub enum JobKind {
    Enhance,
    Morphology(MorphologyOp),
    Filter(ColourFilter),
}

impl JobKind {
    /// Run the job to completion on the calling thread.
    pub fn run(
        self,
        input: PixelBuffer,
        params: &ParameterBag,
        progress: &dyn ProgressSink,
    ) -> Result<PixelBuffer> {
        match self {
            Self::Enhance => EnhancementPipeline::from_bag(params).run(input, progress),
            Self::Morphology(op) => {
                let settings = MorphologySettings::from_bag(op, params);
                apply_morphology(&input, op, &settings, progress)
            }
            Self::Filter(filter) => {
                apply_filter(&input, filter, &FilterSettings::from_bag(params), progress)
            }
        }
    }

    /// File name for this job's result, e.g.
    /// `enhanced_20260101_120000_1a2b3c4d_cat.png`. The task id prefix keeps
    /// names from two tasks on the same source in the same second apart.
    pub fn result_name(self, at: DateTime<Utc>, task: TaskId, source_name: &str) -> String {
        let stamp = at.format("%Y%m%d_%H%M%S");
        let short = task.0.simple().to_string();
        let short = &short[..8];
        let source = sanitize(source_name);
        match self {
            Self::Enhance => format!("enhanced_{stamp}_{short}_{source}"),
            Self::Morphology(op) => format!("morph_{op}_{stamp}_{short}_{source}"),
            Self::Filter(filter) => format!("filter_{filter}_{stamp}_{short}_{source}"),
        }
    }

    /// Whether this job runs the adaptive enhancement pipeline.
    pub fn is_enhancement(self) -> bool {
        matches!(self, Self::Enhance)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enhance => f.write_str("enhance"),
            Self::Morphology(op) => write!(f, "morphology:{op}"),
            Self::Filter(filter) => write!(f, "filter:{filter}"),
        }
    }
}

/// Keep only the final path component, and only characters safe in a file
/// name. Results are always PNG.
fn sanitize(source_name: &str) -> String {
    let base = source_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_name);
    let stem = base.rsplit_once('.').map_or(base, |(stem, _)| stem);
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = if cleaned.chars().all(|c| c == '_') {
        "image".to_string()
    } else {
        cleaned
    };
    format!("{cleaned}.png")
}
