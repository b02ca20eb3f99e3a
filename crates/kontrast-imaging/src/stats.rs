// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Windowed local statistics: mean, standard deviation and Shannon entropy
// around every pixel.
//
// Mean and deviation come from a summed-area table over a reflect-padded copy
// of the plane, so cost per pixel does not depend on the window size.
// Entropy uses a 16-level histogram that slides along each row of a 64x64
// output tile.

use kontrast_core::error::{KontrastError, Result};
use tracing::{debug, instrument};

use crate::buffer::{FloatBuffer, Plane, reflect_index};

/// Number of quantisation levels used for entropy histograms.
pub const ENTROPY_LEVELS: usize = 16;

/// Value of the placeholder entropy map used when entropy is skipped.
pub const ENTROPY_PLACEHOLDER: f32 = 0.5;

const TILE: u32 = 64;

/// Force a window size to be odd (and at least 1).
pub fn odd_window(size: u32) -> u32 {
    if size == 0 {
        1
    } else if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

// ---------------------------------------------------------------------------
// Mean / standard deviation
// ---------------------------------------------------------------------------

/// Summed-area tables of values and squared values over a padded plane.
struct IntegralImage {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl IntegralImage {
    fn padded(plane: &Plane, radius: usize) -> Self {
        let (w, h) = plane.dimensions();
        let pw = w as usize + 2 * radius;
        let ph = h as usize + 2 * radius;
        let stride = pw + 1;
        let mut sum = vec![0.0f64; stride * (ph + 1)];
        let mut sq = vec![0.0f64; stride * (ph + 1)];

        for py in 0..ph {
            let sy = reflect_index(py as i64 - radius as i64, h as usize);
            let mut row_sum = 0.0f64;
            let mut row_sq = 0.0f64;
            for px in 0..pw {
                let sx = reflect_index(px as i64 - radius as i64, w as usize);
                let v = plane.get(sx as u32, sy as u32) as f64;
                row_sum += v;
                row_sq += v * v;
                let idx = (py + 1) * stride + px + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq[idx] = sq[idx - stride] + row_sq;
            }
        }

        Self { stride, sum, sq }
    }

    /// Sum and squared sum over the `k`x`k` box whose top-left padded
    /// coordinate is (x, y).
    fn window(&self, x: usize, y: usize, k: usize) -> (f64, f64) {
        let s = self.stride;
        let (a, b, c, d) = (y * s + x, y * s + x + k, (y + k) * s + x, (y + k) * s + x + k);
        (
            self.sum[d] - self.sum[b] - self.sum[c] + self.sum[a],
            self.sq[d] - self.sq[b] - self.sq[c] + self.sq[a],
        )
    }
}

/// Local mean and standard deviation of one plane.
pub fn plane_statistics(plane: &Plane, window_size: u32) -> Result<(Plane, Plane)> {
    if plane.is_empty() {
        return Err(KontrastError::InvalidInput(
            "cannot compute statistics of an empty plane".into(),
        ));
    }
    let k = odd_window(window_size) as usize;
    let radius = k / 2;
    let (w, h) = plane.dimensions();
    let table = IntegralImage::padded(plane, radius);
    let n = (k * k) as f64;

    let mut mean = Vec::with_capacity(w as usize * h as usize);
    let mut std = Vec::with_capacity(w as usize * h as usize);
    for y in 0..h as usize {
        for x in 0..w as usize {
            let (s, sq) = table.window(x, y, k);
            let variance = ((sq - s * s / n) / n).max(0.0);
            mean.push((s / n) as f32);
            std.push(variance.sqrt() as f32);
        }
    }

    Ok((Plane::from_vec(w, h, mean)?, Plane::from_vec(w, h, std)?))
}

/// Per-channel local mean and standard deviation.
#[instrument(skip(buffer), fields(channels = buffer.channel_count()))]
pub fn local_statistics(buffer: &FloatBuffer, window_size: u32) -> Result<(FloatBuffer, FloatBuffer)> {
    let mut stds = Vec::with_capacity(buffer.channel_count());
    let means = buffer.map_planes(|_, plane| {
        let (mean, std) = plane_statistics(plane, window_size)?;
        stds.push(std);
        Ok(mean)
    })?;
    Ok((means, FloatBuffer::from_planes(stds)?))
}

/// Standard deviation rescaled by its global maximum (across all channels)
/// into `[0, 1]`. A flat image maps to zero everywhere.
pub fn normalized_stddev(stddev: &FloatBuffer) -> Result<FloatBuffer> {
    let max = stddev
        .planes()
        .iter()
        .map(Plane::max)
        .fold(0.0f32, f32::max);
    if max <= 0.0 {
        return stddev.map_planes(|_, plane| Ok(plane.map(|_| 0.0)));
    }
    stddev.map_planes(|_, plane| Ok(plane.map(|v| v / max)))
}

// ---------------------------------------------------------------------------
// Entropy
// ---------------------------------------------------------------------------

/// Local Shannon entropy of a single-channel plane, normalised by its
/// maximum to `[0, 1]`.
#[instrument(skip(plane), fields(width = plane.width(), height = plane.height()))]
pub fn local_entropy(plane: &Plane, window_size: u32) -> Result<Plane> {
    if plane.is_empty() {
        return Err(KontrastError::InvalidInput(
            "cannot compute entropy of an empty plane".into(),
        ));
    }
    let k = odd_window(window_size) as i64;
    let radius = k / 2;
    let (w, h) = plane.dimensions();
    let n = (k * k) as usize;

    let levels: Vec<u8> = plane
        .data()
        .iter()
        .map(|&v| (v.clamp(0.0, 255.0) as u32 / (256 / ENTROPY_LEVELS as u32)) as u8)
        .collect();
    let level_at = |x: i64, y: i64| -> usize {
        let xr = reflect_index(x, w as usize);
        let yr = reflect_index(y, h as usize);
        levels[yr * w as usize + xr] as usize
    };

    // -p*log2(p) for every possible bin count.
    let term: Vec<f32> = (0..=n)
        .map(|c| {
            if c == 0 {
                0.0
            } else {
                let p = c as f64 / n as f64;
                (-p * p.log2()) as f32
            }
        })
        .collect();

    let mut out = vec![0.0f32; w as usize * h as usize];
    for tile_y in (0..h).step_by(TILE as usize) {
        for tile_x in (0..w).step_by(TILE as usize) {
            let x_end = (tile_x + TILE).min(w);
            let y_end = (tile_y + TILE).min(h);
            for y in tile_y..y_end {
                let y = y as i64;
                let mut hist = [0usize; ENTROPY_LEVELS];
                let x0 = tile_x as i64;
                for wy in y - radius..=y + radius {
                    for wx in x0 - radius..=x0 + radius {
                        hist[level_at(wx, wy)] += 1;
                    }
                }
                for x in tile_x as i64..x_end as i64 {
                    if x > x0 {
                        for wy in y - radius..=y + radius {
                            hist[level_at(x - radius - 1, wy)] -= 1;
                            hist[level_at(x + radius, wy)] += 1;
                        }
                    }
                    out[y as usize * w as usize + x as usize] =
                        hist.iter().map(|&c| term[c]).sum();
                }
            }
        }
    }

    let max = out.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        out.iter_mut().for_each(|v| *v /= max);
    }
    debug!(window = k, max_entropy = max, "Local entropy computed");
    Plane::from_vec(w, h, out)
}

// ---------------------------------------------------------------------------
// Combined map
// ---------------------------------------------------------------------------

/// How the entropy component of a `LocalStatsMap` is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntropyMode {
    /// Compute local entropy on the luminance channel with this window.
    Compute { window_size: u32 },
    /// Skip the computation and use a flat map of `ENTROPY_PLACEHOLDER`.
    Placeholder,
}

/// Per-pixel mean, standard deviation and entropy for one enhancement run.
///
/// Entropy is a single luminance-derived plane that applies to every channel.
#[derive(Debug, Clone)]
pub struct LocalStatsMap {
    pub mean: FloatBuffer,
    pub stddev: FloatBuffer,
    pub entropy: Plane,
    pub window_size: u32,
}

impl LocalStatsMap {
    pub fn compute(buffer: &FloatBuffer, window_size: u32, entropy: EntropyMode) -> Result<Self> {
        let window_size = odd_window(window_size);
        let (mean, stddev) = local_statistics(buffer, window_size)?;
        let entropy = Self::entropy_plane(buffer, entropy)?;
        Ok(Self {
            mean,
            stddev,
            entropy,
            window_size,
        })
    }

    pub(crate) fn entropy_plane(buffer: &FloatBuffer, mode: EntropyMode) -> Result<Plane> {
        let (w, h) = buffer.dimensions();
        match mode {
            EntropyMode::Placeholder => Ok(Plane::filled(w, h, ENTROPY_PLACEHOLDER)),
            EntropyMode::Compute { window_size } => local_entropy(&luma_plane(buffer), window_size),
        }
    }

    pub fn normalized_stddev(&self) -> Result<FloatBuffer> {
        normalized_stddev(&self.stddev)
    }
}

/// Quantised 8-bit luminance of a float buffer as a plane.
pub(crate) fn luma_plane(buffer: &FloatBuffer) -> Plane {
    let planes = buffer.planes();
    if planes.len() == 1 {
        return planes[0].clip_and_normalize();
    }
    let (w, h) = buffer.dimensions();
    let data = (0..w as usize * h as usize)
        .map(|i| {
            let [r, g, b] = [0, 1, 2].map(|c| planes[c].data()[i].clamp(0.0, 255.0));
            crate::buffer::luma_of(r, g, b).round()
        })
        .collect();
    Plane::from_vec(w, h, data).unwrap_or_else(|_| Plane::filled(w, h, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Channels, PixelBuffer};

    fn ramp(w: u32, h: u32) -> Plane {
        let data = (0..w * h).map(|i| ((i * 37) % 256) as f32).collect();
        Plane::from_vec(w, h, data).expect("plane")
    }

    fn naive_mean(plane: &Plane, x: u32, y: u32, k: u32) -> f32 {
        let r = (k / 2) as i64;
        let mut s = 0.0f64;
        for dy in -r..=r {
            for dx in -r..=r {
                s += plane.get_reflected(x as i64 + dx, y as i64 + dy) as f64;
            }
        }
        (s / (k * k) as f64) as f32
    }

    #[test]
    fn even_windows_become_odd() {
        assert_eq!(odd_window(4), 5);
        assert_eq!(odd_window(7), 7);
        assert_eq!(odd_window(0), 1);
    }

    #[test]
    fn constant_plane_has_zero_deviation() {
        for window in [2, 3, 8, 15, 31] {
            let buffer = FloatBuffer::from_pixels(
                &PixelBuffer::filled(23, 17, Channels::Rgb, 201).expect("buffer"),
            );
            let (mean, std) = local_statistics(&buffer, window).expect("stats");
            for plane in mean.planes() {
                assert!(plane.data().iter().all(|&v| v == 201.0), "window {window}");
            }
            for plane in std.planes() {
                assert!(plane.data().iter().all(|&v| v == 0.0), "window {window}");
            }
        }
    }

    #[test]
    fn summed_area_matches_direct_sum() {
        let plane = ramp(19, 11);
        let (mean, _) = plane_statistics(&plane, 5).expect("stats");
        for (x, y) in [(0, 0), (18, 10), (9, 5), (1, 10)] {
            let expected = naive_mean(&plane, x, y, 5);
            assert!((mean.get(x, y) - expected).abs() < 1e-3, "({x},{y})");
        }
    }

    #[test]
    fn window_larger_than_image_still_works() {
        let plane = ramp(4, 3);
        let (mean, std) = plane_statistics(&plane, 21).expect("stats");
        assert_eq!(mean.dimensions(), (4, 3));
        assert!(std.data().iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn flat_image_normalizes_to_zero() {
        let std = FloatBuffer::from_planes(vec![Plane::filled(5, 5, 0.0)]).expect("buffer");
        let norm = normalized_stddev(&std).expect("normalize");
        assert!(norm.planes()[0].data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn entropy_is_zero_on_flat_and_bounded_elsewhere() {
        let flat = Plane::filled(30, 30, 90.0);
        assert!(local_entropy(&flat, 7).expect("entropy").data().iter().all(|&v| v == 0.0));

        let noisy = ramp(70, 40);
        let entropy = local_entropy(&noisy, 7).expect("entropy");
        let max = entropy.max();
        assert!((max - 1.0).abs() < 1e-6);
        assert!(entropy.data().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn tiled_entropy_matches_untiled_histogram() {
        // 70 columns forces a second tile; values there must match a fresh
        // histogram computed for the same window.
        let plane = ramp(70, 3);
        let k = 5i64;
        let entropy = local_entropy(&plane, k as u32).expect("entropy");
        let raw = |x: i64, y: i64| {
            let mut hist = [0usize; ENTROPY_LEVELS];
            for wy in y - 2..=y + 2 {
                for wx in x - 2..=x + 2 {
                    hist[(plane.get_reflected(wx, wy) as usize) / 16] += 1;
                }
            }
            hist.iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / 25.0;
                    -p * p.log2()
                })
                .sum::<f64>()
        };
        let r0 = raw(0, 0);
        let r1 = raw(66, 1);
        let e0 = entropy.get(0, 0) as f64;
        let e1 = entropy.get(66, 1) as f64;
        // Both are scaled by the same maximum.
        assert!((e0 * r1 - e1 * r0).abs() < 1e-4);
    }

    #[test]
    fn placeholder_entropy_is_flat_half() {
        let buffer = FloatBuffer::from_pixels(
            &PixelBuffer::filled(8, 8, Channels::Gray, 10).expect("buffer"),
        );
        let stats = LocalStatsMap::compute(&buffer, 4, EntropyMode::Placeholder).expect("stats");
        assert_eq!(stats.window_size, 5);
        assert!(stats.entropy.data().iter().all(|&v| v == ENTROPY_PLACEHOLDER));
    }
}
