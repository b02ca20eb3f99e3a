// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-plane filter primitives used by the enhancement stages.

use image::{ImageBuffer, Luma};
use imageproc::filter::{filter3x3, separable_filter_equal};
use kontrast_core::error::{KontrastError, Result};

use crate::buffer::Plane;

type FloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Centre 9, neighbours -1.
const SHARPEN_3X3: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Sigma implied by a Gaussian kernel size when none is given.
pub fn sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn to_image(plane: &Plane) -> Result<FloatImage> {
    let (w, h) = plane.dimensions();
    FloatImage::from_raw(w, h, plane.data().to_vec())
        .ok_or_else(|| KontrastError::InvalidInput("plane/shape mismatch".into()))
}

fn from_image(image: FloatImage) -> Result<Plane> {
    let (w, h) = image.dimensions();
    Plane::from_vec(w, h, image.into_raw())
}

/// Normalised 1-D Gaussian with `size` taps.
fn gaussian_taps(size: u32, sigma: f32) -> Vec<f32> {
    let radius = (size / 2) as i32;
    let denom = 2.0 * sigma * sigma;
    let taps: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}

/// Gaussian blur over a `kernel_size` square window (forced odd). A
/// non-positive `sigma` is derived from the size; a size of 1 is a copy.
/// Edges are padded by continuity.
pub fn gaussian_blur(plane: &Plane, kernel_size: u32, sigma: f32) -> Result<Plane> {
    let size = kernel_size | 1;
    if size <= 1 {
        return Ok(plane.clone());
    }
    let sigma = if sigma > 0.0 { sigma } else { sigma_for_kernel(size) };
    let blurred = separable_filter_equal(&to_image(plane)?, &gaussian_taps(size, sigma));
    from_image(blurred)
}

/// Unsharp mask: `src + amount * detail`, where detail below `threshold` in
/// magnitude is ignored. The result is clipped to the 8-bit range.
pub fn unsharp_mask(
    plane: &Plane,
    kernel_size: u32,
    sigma: f32,
    amount: f32,
    threshold: f32,
) -> Result<Plane> {
    let src = plane.clip_and_normalize();
    let blurred = gaussian_blur(&src, kernel_size, sigma)?;
    let out = src.zip_map(&blurred, |v, b| {
        let detail = v - b;
        let detail = if detail.abs() < threshold { 0.0 } else { detail };
        v + amount * detail
    })?;
    Ok(out.clip_and_normalize())
}

/// High-boost filter: `src + factor * (src - blur)`, clipped.
pub fn high_boost(plane: &Plane, kernel_size: u32, factor: f32) -> Result<Plane> {
    let src = plane.clip_and_normalize();
    let blurred = gaussian_blur(&src, kernel_size, 0.0)?;
    Ok(src
        .zip_map(&blurred, |v, b| v + factor * (v - b))?
        .clip_and_normalize())
}

/// Fixed 3x3 sharpening kernel. Edges are padded by continuity.
pub fn sharpen_kernel(plane: &Plane) -> Result<Plane> {
    let sharpened: FloatImage = filter3x3(&to_image(plane)?, &SHARPEN_3X3);
    from_image(sharpened)
}

/// Edge-preserving bilateral smoothing where each pixel uses its own odd
/// diameter from `diameters` (row-major, one entry per pixel).
///
/// Input samples are clipped to 8 bits first. Neighbourhoods are circular
/// and addressed with reflect borders.
pub fn adaptive_bilateral(
    plane: &Plane,
    diameters: &[u32],
    sigma_color: f32,
    sigma_space: f32,
) -> Result<Plane> {
    let (w, h) = plane.dimensions();
    if diameters.len() != w as usize * h as usize {
        return Err(KontrastError::InvalidInput(format!(
            "kernel map has {} entries for a {w}x{h} plane",
            diameters.len()
        )));
    }
    if !(sigma_color > 0.0 && sigma_space > 0.0) {
        return Err(KontrastError::InvalidInput(format!(
            "bilateral sigmas must be positive (color {sigma_color}, space {sigma_space})"
        )));
    }

    let src = plane.clip_and_normalize();
    let max_radius = diameters.iter().copied().max().unwrap_or(1) as i64 / 2;
    let side = (2 * max_radius + 1) as usize;

    let space_coeff = -0.5 / (sigma_space as f64 * sigma_space as f64);
    let spatial: Vec<f32> = (0..side * side)
        .map(|i| {
            let dy = (i / side) as i64 - max_radius;
            let dx = (i % side) as i64 - max_radius;
            ((dx * dx + dy * dy) as f64 * space_coeff).exp() as f32
        })
        .collect();
    let color_coeff = -0.5 / (sigma_color as f64 * sigma_color as f64);
    let range: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f64 * color_coeff).exp() as f32)
        .collect();

    let mut out = Vec::with_capacity(w as usize * h as usize);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let radius = diameters[y as usize * w as usize + x as usize] as i64 / 2;
            let centre = src.get(x as u32, y as u32);
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx * dx + dy * dy > radius * radius {
                        continue;
                    }
                    let v = src.get_reflected(x + dx, y + dy);
                    let s = spatial
                        [((dy + max_radius) as usize) * side + (dx + max_radius) as usize];
                    let wgt = s * range[(v - centre).abs().round() as usize];
                    acc += wgt * v;
                    norm += wgt;
                }
            }
            out.push(if norm > 0.0 { acc / norm } else { centre });
        }
    }
    Plane::from_vec(w, h, out)
}
