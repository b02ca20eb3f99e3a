// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contrast-limited adaptive histogram equalisation.
//
// The plane is divided into a `grid` x `grid` array of equally sized tiles
// (reflect-padded at the right/bottom edge when the size does not divide).
// Each tile gets a clipped, redistributed histogram and an equalisation LUT;
// output pixels bilinearly interpolate between the four nearest tile LUTs.
// Colour buffers are equalised on the luma of a YCbCr decomposition.

use kontrast_core::error::{KontrastError, Result};
use tracing::debug;

use crate::buffer::{FloatBuffer, Plane, reflect_index};

const BINS: usize = 256;

/// Equalise one plane. Samples are quantised to 8 bits first.
pub fn clahe_plane(plane: &Plane, clip_limit: f32, grid: u32) -> Plane {
    let (w, h) = plane.dimensions();
    let grid = grid.max(1) as usize;
    let (w, h) = (w as usize, h as usize);
    let tile_w = w.div_ceil(grid);
    let tile_h = h.div_ceil(grid);
    let area = tile_w * tile_h;

    let src: Vec<u8> = plane
        .clip_and_normalize()
        .data()
        .iter()
        .map(|&v| v as u8)
        .collect();
    let clip = ((clip_limit.max(0.0) as f64 * area as f64 / BINS as f64) as usize).max(1);

    let mut luts = vec![[0u8; BINS]; grid * grid];
    for ty in 0..grid {
        for tx in 0..grid {
            let mut hist = [0usize; BINS];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect_index(y as i64, h);
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect_index(x as i64, w);
                    hist[src[sy * w + sx] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, clip);
            luts[ty * grid + tx] = equalisation_lut(&hist, area);
        }
    }

    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;
    let last = grid as i64 - 1;
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        let gy = y as f32 * inv_th - 0.5;
        let ty1 = gy.floor() as i64;
        let ay = gy - ty1 as f32;
        let (ty1, ty2) = (ty1.clamp(0, last) as usize, (ty1 + 1).clamp(0, last) as usize);
        for x in 0..w {
            let gx = x as f32 * inv_tw - 0.5;
            let tx1 = gx.floor() as i64;
            let ax = gx - tx1 as f32;
            let (tx1, tx2) = (tx1.clamp(0, last) as usize, (tx1 + 1).clamp(0, last) as usize);

            let v = src[y * w + x] as usize;
            let at = |tx: usize, ty: usize| luts[ty * grid + tx][v] as f32;
            let top = at(tx1, ty1) * (1.0 - ax) + at(tx2, ty1) * ax;
            let bottom = at(tx1, ty2) * (1.0 - ax) + at(tx2, ty2) * ax;
            out.push((top * (1.0 - ay) + bottom * ay).round());
        }
    }
    debug!(grid, tile_w, tile_h, clip, "CLAHE applied");
    Plane::from_vec(w as u32, h as u32, out).unwrap_or_else(|_| plane.clone())
}

/// Clip every bin at `limit` and spread the excess evenly, with the
/// remainder handed out at a regular stride.
fn clip_histogram(hist: &mut [usize; BINS], limit: usize) {
    let mut excess = 0usize;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let batch = excess / BINS;
    let mut residual = excess - batch * BINS;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut i = 0;
        while i < BINS && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

fn equalisation_lut(hist: &[usize; BINS], area: usize) -> [u8; BINS] {
    let scale = 255.0 / area as f32;
    let mut lut = [0u8; BINS];
    let mut cdf = 0usize;
    for (v, &count) in hist.iter().enumerate() {
        cdf += count;
        lut[v] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Equalise a buffer: gray buffers directly, colour buffers on YCbCr luma
/// with chroma carried through unchanged.
pub fn clahe(buffer: &FloatBuffer, clip_limit: f32, grid: u32) -> Result<FloatBuffer> {
    match buffer.planes() {
        [gray] => FloatBuffer::from_planes(vec![clahe_plane(gray, clip_limit, grid)]),
        [r, g, b] => {
            let (y, cb, cr) = to_ycbcr(r, g, b)?;
            let y = clahe_plane(&y, clip_limit, grid);
            let (r, g, b) = from_ycbcr(&y, &cb, &cr)?;
            FloatBuffer::from_planes(vec![r, g, b])
        }
        other => Err(KontrastError::InvalidInput(format!(
            "CLAHE needs 1 or 3 channels, got {}",
            other.len()
        ))),
    }
}

pub(crate) fn to_ycbcr(r: &Plane, g: &Plane, b: &Plane) -> Result<(Plane, Plane, Plane)> {
    let rg = r.zip_map(g, |r, g| 0.299 * r + 0.587 * g)?;
    let y = rg.zip_map(b, |rg, b| rg + 0.114 * b)?;
    let cb = r
        .zip_map(g, |r, g| -0.168_736 * r - 0.331_264 * g)?
        .zip_map(b, |rg, b| 128.0 + rg + 0.5 * b)?;
    let cr = r
        .zip_map(g, |r, g| 0.5 * r - 0.418_688 * g)?
        .zip_map(b, |rg, b| 128.0 + rg - 0.081_312 * b)?;
    Ok((y, cb, cr))
}

pub(crate) fn from_ycbcr(y: &Plane, cb: &Plane, cr: &Plane) -> Result<(Plane, Plane, Plane)> {
    let r = y.zip_map(cr, |y, cr| y + 1.402 * (cr - 128.0))?;
    let g = y
        .zip_map(cb, |y, cb| y - 0.344_136 * (cb - 128.0))?
        .zip_map(cr, |yg, cr| yg - 0.714_136 * (cr - 128.0))?;
    let b = y.zip_map(cb, |y, cb| y + 1.772 * (cb - 128.0))?;
    Ok((r, g, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{Channels, PixelBuffer};

    #[test]
    fn uniform_input_gives_uniform_output() {
        // 50 is not a multiple of the grid, so edge tiles are padded.
        let plane = Plane::filled(50, 50, 128.0);
        let out = clahe_plane(&plane, 2.0, 8);
        let first = out.get(0, 0);
        assert!(out.data().iter().all(|&v| v == first));
    }

    #[test]
    fn clipped_histogram_keeps_its_mass() {
        let mut hist = [0usize; BINS];
        hist[10] = 500;
        hist[20] = 12;
        clip_histogram(&mut hist, 40);
        assert_eq!(hist.iter().sum::<usize>(), 512);
        assert!(hist[10] <= 40 + 2);
    }

    #[test]
    fn low_contrast_gradient_is_stretched() {
        let data = (0..64 * 64).map(|i| 100.0 + ((i % 64) / 8) as f32).collect();
        let plane = Plane::from_vec(64, 64, data).expect("plane");
        let out = clahe_plane(&plane, 40.0, 1);
        let spread_in = 7.0;
        let spread_out = out.max() - out.data().iter().copied().fold(f32::MAX, f32::min);
        assert!(spread_out > spread_in * 4.0);
    }

    #[test]
    fn gray_rgb_keeps_neutral_chroma() {
        let buffer = FloatBuffer::from_pixels(
            &PixelBuffer::filled(16, 16, Channels::Rgb, 60).expect("buffer"),
        );
        let out = clahe(&buffer, 2.0, 4).expect("clahe");
        let planes = out.planes();
        for i in 0..16 * 16 {
            let r = planes[0].data()[i];
            assert!((planes[1].data()[i] - r).abs() < 0.01);
            assert!((planes[2].data()[i] - r).abs() < 0.01);
        }
    }
}
