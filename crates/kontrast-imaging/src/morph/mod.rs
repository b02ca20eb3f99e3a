// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Morphology front end. The binary family (thinning, skeletonisation,
// thickening, hit-or-miss) binarises its input and paints results back; the
// grayscale family works on each channel's intensities directly.

pub mod binary;
pub mod gray;
pub mod skeleton;
pub mod thicken;
pub mod thinning;

use std::fmt;
use std::str::FromStr;

use kontrast_core::ParameterBag;
use kontrast_core::error::{KontrastError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::buffer::{Channels, PixelBuffer};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::settings::{flag_or, number_in, odd_in, size_in};

pub use binary::{BinaryImage, Border, HitMissPattern, StructuringElement, hit_or_miss};
pub use gray::apply_gray;
pub use skeleton::{SkeletonOutcome, skeletonize};
pub use thicken::{Direction, thicken};
pub use thinning::{ThinningOutcome, thinning_pass, zhang_suen};

/// Overlay colours (RGB) for each operation.
const THINNING_COLOUR: [u8; 3] = [255, 0, 0];
const SKELETON_COLOUR: [u8; 3] = [0, 0, 255];
const THICKENING_COLOUR: [u8; 3] = [0, 255, 0];
/// Weight of the original image when blending hit-or-miss detections.
const HIT_MISS_ORIGINAL_WEIGHT: f32 = 0.7;

/// A morphology operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MorphologyOp {
    Thinning,
    Skeletonize,
    Thicken,
    HitOrMiss,
    Dilation,
    Erosion,
    Opening,
    Closing,
    #[serde(rename = "tophat")]
    TopHat,
    #[serde(rename = "blackhat")]
    BlackHat,
    Gradient,
}

impl MorphologyOp {
    pub const ALL: [MorphologyOp; 11] = [
        Self::Thinning,
        Self::Skeletonize,
        Self::Thicken,
        Self::HitOrMiss,
        Self::Dilation,
        Self::Erosion,
        Self::Opening,
        Self::Closing,
        Self::TopHat,
        Self::BlackHat,
        Self::Gradient,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Thinning => "thinning",
            Self::Skeletonize => "skeletonize",
            Self::Thicken => "thicken",
            Self::HitOrMiss => "hit_or_miss",
            Self::Dilation => "dilation",
            Self::Erosion => "erosion",
            Self::Opening => "opening",
            Self::Closing => "closing",
            Self::TopHat => "tophat",
            Self::BlackHat => "blackhat",
            Self::Gradient => "gradient",
        }
    }

    /// Operations that threshold their input to a binary mask first.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Self::Thinning | Self::Skeletonize | Self::Thicken | Self::HitOrMiss
        )
    }
}

impl fmt::Display for MorphologyOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MorphologyOp {
    type Err = KontrastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "thinning" | "thin" => Ok(Self::Thinning),
            "skeletonize" | "skeletonization" | "skeleton" => Ok(Self::Skeletonize),
            "thicken" | "thickening" => Ok(Self::Thicken),
            "hit_or_miss" | "hit_miss" | "hitmiss" => Ok(Self::HitOrMiss),
            "dilation" | "dilate" => Ok(Self::Dilation),
            "erosion" | "erode" => Ok(Self::Erosion),
            "opening" | "open" => Ok(Self::Opening),
            "closing" | "close" => Ok(Self::Closing),
            "tophat" | "top_hat" | "white_tophat" => Ok(Self::TopHat),
            "blackhat" | "black_hat" | "black_tophat" => Ok(Self::BlackHat),
            "gradient" | "morphological_gradient" => Ok(Self::Gradient),
            other => Err(KontrastError::InvalidInput(format!(
                "unknown morphology operation '{other}'"
            ))),
        }
    }
}

/// Options for a morphology run. Out-of-range values are clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphologySettings {
    /// Luma strictly above this is foreground.
    pub threshold: u8,
    /// Iteration cap for thinning; repeat count for everything else.
    pub iterations: u32,
    /// Iteration cap for skeletonisation.
    pub max_iterations: u32,
    /// Paint results over a colour original instead of returning the mask.
    pub preserve_original: bool,
    /// Element size (odd) for hit-or-miss and the grayscale operations.
    pub kernel_size: u32,
    pub pattern: HitMissPattern,
    /// Weight of the detail layer for top-hat, black-hat and gradient.
    pub strength: f32,
}

impl MorphologySettings {
    pub fn from_bag(op: MorphologyOp, bag: &ParameterBag) -> Self {
        let default_iterations = match op {
            MorphologyOp::Thinning => 10,
            MorphologyOp::Thicken => 3,
            _ => 1,
        };
        let default_kernel = match op {
            MorphologyOp::HitOrMiss | MorphologyOp::Gradient => 3,
            MorphologyOp::TopHat => 9,
            _ => 5,
        };
        Self {
            threshold: size_in(bag, "threshold", 127, 0, 255) as u8,
            iterations: size_in(bag, "iterations", default_iterations, 0, 1000),
            max_iterations: size_in(bag, "max_iterations", 100, 0, 10_000),
            preserve_original: flag_or(bag, "preserve_original", true),
            kernel_size: odd_in(bag, "kernel_size", default_kernel, 1, 31),
            pattern: bag
                .text("pattern")
                .and_then(|p| p.parse().ok())
                .unwrap_or(HitMissPattern::Cross),
            strength: number_in(bag, "strength", 1.0, 0.0, 10.0) as f32,
        }
    }
}

/// Run `op` on `input` and return a pixel buffer of the same shape. Binary
/// operations threshold first and render the mask back over the input.
#[instrument(skip(input, op, settings, progress), fields(op = %op, width = input.width(), height = input.height()))]
pub fn apply_morphology(
    input: &PixelBuffer,
    op: MorphologyOp,
    settings: &MorphologySettings,
    progress: &dyn ProgressSink,
) -> Result<PixelBuffer> {
    let mut reporter = ProgressReporter::new(progress);
    if !op.is_binary() {
        reporter.report(0.1);
        let output = apply_gray(
            input,
            op,
            settings.kernel_size,
            settings.iterations,
            settings.strength,
        )
        .map_err(|e| e.in_stage(op.name()))?;
        reporter.report(1.0);
        return Ok(output);
    }

    let binary = BinaryImage::threshold(input, settings.threshold);
    reporter.report(0.1);

    let result = match op {
        MorphologyOp::Thinning => {
            let outcome = zhang_suen(&binary, settings.iterations);
            info!(
                iterations = outcome.iterations,
                converged = outcome.converged,
                "Thinning complete"
            );
            outcome.image
        }
        MorphologyOp::Skeletonize => {
            let outcome = skeletonize(&binary, settings.max_iterations);
            info!(iterations = outcome.iterations, "Skeletonisation complete");
            outcome.image
        }
        MorphologyOp::Thicken => {
            thicken(&binary, settings.iterations).map_err(|e| e.in_stage("thicken"))?
        }
        MorphologyOp::HitOrMiss => {
            let (hit, miss) = settings.pattern.elements(settings.kernel_size);
            let mut current = binary.clone();
            for _ in 0..settings.iterations.max(1) {
                current = hit_or_miss(&current, &hit, &miss).map_err(|e| e.in_stage("hit_or_miss"))?;
            }
            current
        }
        other => return Err(KontrastError::stage(other.name(), "not a binary operation")),
    };
    reporter.report(0.9);

    let output = render(input, &binary, &result, op, settings.preserve_original)?;
    reporter.report(1.0);
    Ok(output)
}

/// Gray inputs get the bare mask. Colour inputs either get the mask on all
/// three channels or the original with the operation's pixels painted in.
fn render(
    input: &PixelBuffer,
    binary: &BinaryImage,
    result: &BinaryImage,
    op: MorphologyOp,
    preserve_original: bool,
) -> Result<PixelBuffer> {
    let (w, h) = input.dimensions();
    if input.channels() == Channels::Gray {
        return PixelBuffer::from_gray(result.to_gray());
    }
    if !preserve_original {
        let data = result
            .pixels()
            .iter()
            .flat_map(|&p| [if p { 255 } else { 0 }; 3])
            .collect();
        return PixelBuffer::new(w, h, Channels::Rgb, data);
    }

    let mut data = input.data().to_vec();
    for (i, (&after, &before)) in result.pixels().iter().zip(binary.pixels()).enumerate() {
        let px = &mut data[i * 3..i * 3 + 3];
        match op {
            MorphologyOp::Thinning if after => px.copy_from_slice(&THINNING_COLOUR),
            MorphologyOp::Skeletonize if after => px.copy_from_slice(&SKELETON_COLOUR),
            MorphologyOp::Thicken if after && !before => px.copy_from_slice(&THICKENING_COLOUR),
            MorphologyOp::HitOrMiss => {
                let overlay = if after { 255.0 } else { 0.0 };
                for v in px.iter_mut() {
                    *v = (*v as f32 * HIT_MISS_ORIGINAL_WEIGHT
                        + overlay * (1.0 - HIT_MISS_ORIGINAL_WEIGHT))
                        .round()
                        .clamp(0.0, 255.0) as u8;
                }
            }
            _ => {}
        }
    }
    PixelBuffer::new(w, h, Channels::Rgb, data)
}
