// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rough processing-time estimate shown to callers while a task runs.

use std::time::Duration;

const SECONDS_PER_MEGAPIXEL: f64 = 1.5;
const ENTROPY_FACTOR: f64 = 1.5;
const REFERENCE_WINDOW: f64 = 15.0;

/// Advisory duration for enhancing a `width` x `height` image. Never below
/// one second and never enforced against the worker.
pub fn estimate_duration(width: u32, height: u32, window_size: u32, use_entropy: bool) -> Duration {
    let megapixels = (width as f64 * height as f64) / 1_000_000.0;
    let entropy = if use_entropy { ENTROPY_FACTOR } else { 1.0 };
    let window = (window_size as f64 / REFERENCE_WINDOW).powi(2);
    let secs = (megapixels * SECONDS_PER_MEGAPIXEL * entropy * window).max(1.0);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_images_floor_at_one_second() {
        assert_eq!(estimate_duration(50, 50, 15, true), Duration::from_secs(1));
    }

    #[test]
    fn scales_with_area_entropy_and_window() {
        // 4 MP * 1.5 s.
        let base = estimate_duration(2000, 2000, 15, false);
        assert!((base.as_secs_f64() - 6.0).abs() < 1e-9);

        let with_entropy = estimate_duration(2000, 2000, 15, true);
        assert!((with_entropy.as_secs_f64() - 9.0).abs() < 1e-9);

        let wide_window = estimate_duration(2000, 2000, 30, false);
        assert!((wide_window.as_secs_f64() - 24.0).abs() < 1e-9);
    }
}
