// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Kontrast imaging: pixel buffers, local statistics, adaptive enhancement,
// morphology and colour filters.

pub mod adjust;
pub mod buffer;
pub mod cache;
pub mod clahe;
pub mod codec;
pub mod enhance;
pub mod filters;
pub mod morph;
pub mod progress;
pub mod settings;
pub mod stats;

pub use adjust::{ColourFilter, FilterSettings, apply_filter};
pub use buffer::{Channels, FloatBuffer, PixelBuffer, Plane};
pub use cache::ImageCache;
pub use enhance::EnhancementPipeline;
pub use morph::{MorphologyOp, MorphologySettings, apply_morphology};
pub use progress::{ChannelProgress, NoProgress, ProgressSink};
pub use settings::EnhancementSettings;
pub use stats::{EntropyMode, LocalStatsMap, local_entropy, local_statistics};
