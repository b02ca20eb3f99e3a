// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grayscale morphology with a flat square element, applied to each channel
// independently. Unlike the binary family these work on the original
// intensities and need no threshold.

use image::GrayImage;
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use kontrast_core::error::{KontrastError, Result};
use tracing::debug;

use super::MorphologyOp;
use crate::buffer::PixelBuffer;

/// Flat square element covering `kernel_size` x `kernel_size` pixels.
pub fn square_mask(kernel_size: u32) -> Mask {
    Mask::square((kernel_size / 2).min(u8::MAX as u32) as u8)
}

fn repeat(image: &GrayImage, times: u32, f: impl Fn(&GrayImage) -> GrayImage) -> GrayImage {
    let mut out = image.clone();
    for _ in 0..times {
        out = f(&out);
    }
    out
}

fn combine(a: &GrayImage, b: &GrayImage, f: impl Fn(u8, u8) -> u8) -> GrayImage {
    let mut out = a.clone();
    for (o, &v) in out.iter_mut().zip(b.as_raw()) {
        *o = f(*o, v);
    }
    out
}

fn scaled(v: u8, strength: f32) -> f32 {
    v as f32 * strength
}

fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Run `op` on a single channel. `iterations` is at least one.
pub fn transform_channel(
    channel: &GrayImage,
    op: MorphologyOp,
    kernel_size: u32,
    iterations: u32,
    strength: f32,
) -> Result<GrayImage> {
    let mask = square_mask(kernel_size);
    let n = iterations.max(1);
    let dilate = |img: &GrayImage| repeat(img, n, |i| grayscale_dilate(i, &mask));
    let erode = |img: &GrayImage| repeat(img, n, |i| grayscale_erode(i, &mask));
    // Top-hat and black-hat add their detail back onto the input, at most once.
    let boost = strength.clamp(0.0, 1.0);

    let out = match op {
        MorphologyOp::Dilation => dilate(channel),
        MorphologyOp::Erosion => erode(channel),
        MorphologyOp::Opening => dilate(&erode(channel)),
        MorphologyOp::Closing => erode(&dilate(channel)),
        MorphologyOp::TopHat => {
            let opened = dilate(&erode(channel));
            let detail = combine(channel, &opened, |v, o| v.saturating_sub(o));
            combine(channel, &detail, |v, d| saturate(v as f32 + scaled(d, boost)))
        }
        MorphologyOp::BlackHat => {
            let closed = erode(&dilate(channel));
            let detail = combine(&closed, channel, |c, v| c.saturating_sub(v));
            combine(channel, &detail, |v, d| saturate(v as f32 + scaled(d, boost)))
        }
        MorphologyOp::Gradient => {
            let mut gradient =
                combine(&dilate(channel), &erode(channel), |d, e| d.saturating_sub(e));
            for v in gradient.iter_mut() {
                *v = saturate(scaled(*v, strength));
            }
            gradient
        }
        other => {
            return Err(KontrastError::InvalidInput(format!(
                "{other} is a binary operation"
            )));
        }
    };
    Ok(out)
}

/// Apply a grayscale operation to every channel of `input`.
pub fn apply_gray(
    input: &PixelBuffer,
    op: MorphologyOp,
    kernel_size: u32,
    iterations: u32,
    strength: f32,
) -> Result<PixelBuffer> {
    let channels = input
        .split_channels()
        .iter()
        .map(|c| transform_channel(c, op, kernel_size, iterations, strength))
        .collect::<Result<Vec<_>>>()?;
    debug!(%op, kernel_size, iterations, "grayscale morphology finished");
    PixelBuffer::merge_channels(&channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// 9x9 at 50 with a bright 3x3 block at 200 and one dark pixel at 10.
    fn scene() -> GrayImage {
        GrayImage::from_fn(9, 9, |x, y| {
            if (2..5).contains(&x) && (2..5).contains(&y) {
                Luma([200])
            } else if (x, y) == (7, 7) {
                Luma([10])
            } else {
                Luma([50])
            }
        })
    }

    fn run(op: MorphologyOp, kernel: u32, strength: f32) -> GrayImage {
        transform_channel(&scene(), op, kernel, 1, strength).expect("transform")
    }

    #[test]
    fn dilation_grows_bright_and_erosion_grows_dark() {
        let dilated = run(MorphologyOp::Dilation, 3, 1.0);
        assert_eq!(dilated.get_pixel(1, 1)[0], 200);
        assert_eq!(dilated.get_pixel(7, 7)[0], 50);

        let eroded = run(MorphologyOp::Erosion, 3, 1.0);
        assert_eq!(eroded.get_pixel(3, 3)[0], 200);
        assert_eq!(eroded.get_pixel(2, 2)[0], 50);
        assert_eq!(eroded.get_pixel(6, 6)[0], 10);
    }

    #[test]
    fn opening_removes_small_bright_detail_closing_small_dark() {
        let opened = run(MorphologyOp::Opening, 5, 1.0);
        assert!(opened.pixels().all(|p| p[0] <= 50));
        let closed = run(MorphologyOp::Closing, 3, 1.0);
        assert_eq!(closed.get_pixel(7, 7)[0], 50);
        assert_eq!(closed.get_pixel(3, 3)[0], 200);
    }

    #[test]
    fn top_hat_boosts_bright_detail_black_hat_fills_dark() {
        let top = run(MorphologyOp::TopHat, 5, 1.0);
        // 200 + (200 - 50) saturates.
        assert_eq!(top.get_pixel(3, 3)[0], 255);
        assert_eq!(top.get_pixel(0, 0)[0], 50);

        let half = run(MorphologyOp::TopHat, 5, 0.5);
        assert_eq!(half.get_pixel(3, 3)[0], 255);
        assert_eq!(half.get_pixel(0, 0)[0], 50);

        let black = run(MorphologyOp::BlackHat, 3, 1.0);
        // 10 + (50 - 10).
        assert_eq!(black.get_pixel(7, 7)[0], 50);
        assert_eq!(black.get_pixel(3, 3)[0], 200);
    }

    #[test]
    fn gradient_outlines_edges() {
        let gradient = run(MorphologyOp::Gradient, 3, 1.0);
        assert_eq!(gradient.get_pixel(0, 0)[0], 0);
        assert_eq!(gradient.get_pixel(2, 2)[0], 150);
        let weak = run(MorphologyOp::Gradient, 3, 0.5);
        assert_eq!(weak.get_pixel(2, 2)[0], 75);
    }

    #[test]
    fn colour_channels_are_processed_independently() {
        let mut data = vec![0u8; 5 * 5 * 3];
        // One red pixel in the middle.
        data[(2 * 5 + 2) * 3] = 255;
        let input = PixelBuffer::new(5, 5, crate::buffer::Channels::Rgb, data).expect("buffer");
        let out = apply_gray(&input, MorphologyOp::Dilation, 3, 1, 1.0).expect("dilate");
        let px = |x: usize, y: usize| &out.data()[(y * 5 + x) * 3..(y * 5 + x) * 3 + 3];
        assert_eq!(px(1, 1), &[255, 0, 0]);
        assert_eq!(px(0, 0), &[0, 0, 0]);
    }

    #[test]
    fn iterations_compound_and_binary_ops_are_rejected() {
        let twice = transform_channel(&scene(), MorphologyOp::Dilation, 3, 2, 1.0).expect("dilate");
        assert_eq!(twice.get_pixel(0, 0)[0], 200);
        assert!(transform_channel(&scene(), MorphologyOp::Thinning, 3, 1, 1.0).is_err());
    }
}
