// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed enhancement settings read out of a loose `ParameterBag`.
//
// Reading never fails: absent or unparseable values take their default, and
// values outside their domain are clamped into it.

use kontrast_core::ParameterBag;
use serde::{Deserialize, Serialize};

// -- Bag readers -------------------------------------------------------------

pub(crate) fn number_in(bag: &ParameterBag, key: &str, default: f64, min: f64, max: f64) -> f64 {
    bag.number(key).map(|v| v.clamp(min, max)).unwrap_or(default)
}

pub(crate) fn size_in(bag: &ParameterBag, key: &str, default: u32, min: u32, max: u32) -> u32 {
    bag.number(key)
        .map(|v| (v.round().clamp(min as f64, max as f64)) as u32)
        .unwrap_or(default)
}

/// Odd size in `[min, max]` (both odd). Even values round up.
pub(crate) fn odd_in(bag: &ParameterBag, key: &str, default: u32, min: u32, max: u32) -> u32 {
    let v = size_in(bag, key, default, min, max);
    if v % 2 == 0 { (v + 1).min(max) } else { v }
}

pub(crate) fn flag_or(bag: &ParameterBag, key: &str, default: bool) -> bool {
    bag.flag(key).unwrap_or(default)
}

// -- Settings ----------------------------------------------------------------

/// Every knob of the enhancement pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementSettings {
    pub window_size: u32,
    /// Window used for local entropy; defaults to `window_size`.
    pub entropy_window_size: u32,
    pub clip_limit: f32,
    pub use_entropy: bool,
    pub simplified: bool,
    pub max_processing_dimension: u32,
    pub sharpen: bool,
    pub denoise: bool,
    pub enhance_details: bool,

    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,

    pub min_kernel_size: u32,
    pub max_kernel_size: u32,
    pub bilateral_strength: f32,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_space: f32,
    pub denoise_blend_factor: f32,

    /// Window of the unsharp-mask blur.
    pub unsharp_kernel_size: u32,
    pub unsharp_sigma: f32,
    pub unsharp_amount: f32,
    pub unsharp_threshold: f32,

    pub apply_clahe: bool,
    pub clahe_clip_limit: f32,
    pub clahe_tile_grid: u32,
    pub clahe_blend: f32,

    pub apply_high_boost: bool,
    pub high_boost_kernel_size: u32,
    pub high_boost_factor: f32,
    pub high_boost_blend: f32,
}

impl Default for EnhancementSettings {
    fn default() -> Self {
        Self::from_bag(&ParameterBag::new())
    }
}

impl EnhancementSettings {
    pub fn from_bag(bag: &ParameterBag) -> Self {
        let window_size = odd_in(bag, "window_size", 15, 3, 101);
        let min_kernel_size = odd_in(bag, "min_kernel_size", 3, 1, 31);
        let max_kernel_size = odd_in(bag, "max_kernel_size", 7, 1, 31).max(min_kernel_size);
        // use_entropy defaults on; disable_entropy wins when both are given.
        let use_entropy =
            flag_or(bag, "use_entropy", true) && !flag_or(bag, "disable_entropy", false);

        Self {
            window_size,
            entropy_window_size: odd_in(bag, "entropy_window_size", window_size, 3, 101),
            clip_limit: number_in(bag, "clip_limit", 3.0, 0.1, 40.0) as f32,
            use_entropy,
            simplified: flag_or(bag, "simplified_processing", false),
            max_processing_dimension: size_in(bag, "max_processing_dimension", 1200, 64, 16384),
            sharpen: flag_or(bag, "sharpen", true),
            denoise: flag_or(bag, "denoise", true),
            enhance_details: flag_or(bag, "enhance_details", true),

            alpha: number_in(bag, "alpha", 1.0, 0.0, 5.0) as f32,
            beta: number_in(bag, "beta", 0.5, 0.0, 2.0) as f32,
            gamma: number_in(bag, "gamma", 0.75, 0.0, 5.0) as f32,

            min_kernel_size,
            max_kernel_size,
            bilateral_strength: number_in(bag, "bilateral_strength", 1.0, 0.0, 10.0) as f32,
            bilateral_sigma_color: number_in(bag, "bilateral_sigma_color", 75.0, 0.1, 1000.0)
                as f32,
            bilateral_sigma_space: number_in(bag, "bilateral_sigma_space", 75.0, 0.1, 1000.0)
                as f32,
            denoise_blend_factor: number_in(bag, "denoise_blend_factor", 0.7, 0.0, 1.0) as f32,

            unsharp_kernel_size: odd_in(bag, "unsharp_kernel_size", 5, 1, 31),
            unsharp_sigma: number_in(bag, "unsharp_sigma", 1.0, 0.01, 20.0) as f32,
            unsharp_amount: number_in(bag, "unsharp_amount", 1.0, 0.0, 5.0) as f32,
            unsharp_threshold: number_in(bag, "unsharp_threshold", 5.0, 0.0, 255.0) as f32,

            apply_clahe: flag_or(bag, "apply_clahe", true),
            clahe_clip_limit: number_in(bag, "clahe_clip_limit", 2.0, 0.1, 40.0) as f32,
            clahe_tile_grid: size_in(bag, "clahe_tile_grid", 8, 1, 64),
            clahe_blend: number_in(bag, "clahe_blend", 0.5, 0.0, 1.0) as f32,

            apply_high_boost: flag_or(bag, "apply_high_boost", true),
            high_boost_kernel_size: odd_in(bag, "high_boost_kernel_size", 5, 1, 31),
            high_boost_factor: number_in(bag, "high_boost_factor", 1.5, 0.0, 10.0) as f32,
            high_boost_blend: number_in(bag, "high_boost_blend", 0.3, 0.0, 1.0) as f32,
        }
    }

    /// Effective bilateral sigmas after applying `bilateral_strength`.
    /// Zero strength still yields a usable (tiny) filter.
    pub fn bilateral_sigmas(&self) -> (f32, f32) {
        let s = self.bilateral_strength.max(0.01);
        (self.bilateral_sigma_color * s, self.bilateral_sigma_space * s)
    }
}
