// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adaptive enhancement pipeline. Downscale for speed, enhance from local
// statistics (or take the simplified CLAHE path), then upscale back and
// clip to 8 bits.

use kontrast_core::ParameterBag;
use kontrast_core::error::Result;
use tracing::{debug, info, instrument};

use crate::buffer::{FloatBuffer, PixelBuffer, Plane};
use crate::clahe::clahe;
use crate::filters::{adaptive_bilateral, high_boost, sharpen_kernel, unsharp_mask};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::settings::EnhancementSettings;
use crate::stats::{EntropyMode, LocalStatsMap, local_statistics, normalized_stddev};

/// Tile grid used by the simplified path.
const SIMPLIFIED_GRID: u32 = 8;

/// Stateless enhancement pipeline configured by `EnhancementSettings`.
///
/// ```ignore
/// let pipeline = EnhancementPipeline::from_bag(&params);
/// let enhanced = pipeline.run(buffer, &NoProgress)?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct EnhancementPipeline {
    settings: EnhancementSettings,
}

impl EnhancementPipeline {
    // -- Construction ---------------------------------------------------------

    pub fn new(settings: EnhancementSettings) -> Self {
        Self { settings }
    }

    pub fn from_bag(bag: &ParameterBag) -> Self {
        Self::new(EnhancementSettings::from_bag(bag))
    }

    pub fn settings(&self) -> &EnhancementSettings {
        &self.settings
    }

    // -- Entry point ----------------------------------------------------------

    /// Enhance `input`, returning a buffer with the same dimensions and
    /// channel count. Any stage error aborts the run and names the stage.
    #[instrument(
        skip(self, input, progress),
        fields(width = input.width(), height = input.height(), simplified = self.settings.simplified)
    )]
    pub fn run(&self, input: PixelBuffer, progress: &dyn ProgressSink) -> Result<PixelBuffer> {
        let mut reporter = ProgressReporter::new(progress);
        reporter.report(0.05);

        let original = input.dimensions();
        let ceiling = self.settings.max_processing_dimension;
        let (input, resized) = if original.0.max(original.1) > ceiling {
            let scale = ceiling as f64 / original.0.max(original.1) as f64;
            let w = ((original.0 as f64 * scale) as u32).max(1);
            let h = ((original.1 as f64 * scale) as u32).max(1);
            info!(
                from_w = original.0,
                from_h = original.1,
                to_w = w,
                to_h = h,
                "Downscaling for processing"
            );
            (input.resize(w, h).map_err(|e| e.in_stage("downscale"))?, true)
        } else {
            (input, false)
        };
        reporter.report(0.10);

        let work = FloatBuffer::from_pixels(&input);
        drop(input);

        let enhanced = if self.settings.simplified {
            self.simplified(work, &mut reporter)?
        } else {
            self.standard(work, &mut reporter)?
        };

        let enhanced = if resized {
            reporter.report(0.90);
            debug!(to_w = original.0, to_h = original.1, "Upscaling to original size");
            enhanced
                .resize(original.0, original.1)
                .map_err(|e| e.in_stage("upscale"))?
        } else {
            enhanced
        };

        reporter.report(0.95);
        let output = enhanced
            .clip_and_normalize()
            .to_pixels()
            .map_err(|e| e.in_stage("finalize"))?;
        reporter.report(1.0);
        info!("Enhancement complete");
        Ok(output)
    }

    // -- Paths ----------------------------------------------------------------

    fn standard(&self, work: FloatBuffer, reporter: &mut ProgressReporter<'_>) -> Result<FloatBuffer> {
        let s = &self.settings;
        reporter.report(0.15);

        reporter.report(0.20);
        let (mean, stddev) =
            local_statistics(&work, s.window_size).map_err(|e| e.in_stage("local_statistics"))?;
        reporter.report(0.40);

        reporter.report(0.45);
        let mode = if s.use_entropy {
            EntropyMode::Compute {
                window_size: s.entropy_window_size,
            }
        } else {
            EntropyMode::Placeholder
        };
        let entropy =
            LocalStatsMap::entropy_plane(&work, mode).map_err(|e| e.in_stage("local_entropy"))?;
        let stats = LocalStatsMap {
            mean,
            stddev,
            entropy,
            window_size: s.window_size,
        };
        let std_norm = normalized_stddev(&stats.stddev).map_err(|e| e.in_stage("local_statistics"))?;
        reporter.report(0.60);

        let mut work = work;
        if s.denoise {
            reporter.report(0.65);
            work = self
                .reduce_noise(&work, &std_norm)
                .map_err(|e| e.in_stage("noise_reduction"))?;
        }

        reporter.report(0.70);
        work = self
            .adaptive_contrast(&work, &stats, &std_norm)
            .map_err(|e| e.in_stage("adaptive_contrast"))?;

        if s.enhance_details {
            reporter.report(0.80);
            work = self
                .enhance_details(&work, &std_norm)
                .map_err(|e| e.in_stage("detail_enhancement"))?;
        }

        reporter.report(0.85);
        self.final_adjustments(&work)
            .map_err(|e| e.in_stage("final_adjustments"))
    }

    fn simplified(&self, work: FloatBuffer, reporter: &mut ProgressReporter<'_>) -> Result<FloatBuffer> {
        reporter.report(0.15);
        let equalised = clahe(&work, self.settings.clip_limit, SIMPLIFIED_GRID)
            .map_err(|e| e.in_stage("clahe"))?;
        reporter.report(0.40);

        let result = if self.settings.sharpen {
            equalised
                .map_planes(|_, plane| sharpen_kernel(plane))
                .map_err(|e| e.in_stage("sharpen"))?
        } else {
            equalised
        };
        reporter.report(0.75);
        Ok(result)
    }

    // -- Stages ---------------------------------------------------------------

    /// Bilateral smoothing with a per-pixel diameter that shrinks as local
    /// deviation grows, blended back towards the original on edges.
    fn reduce_noise(&self, image: &FloatBuffer, std_norm: &FloatBuffer) -> Result<FloatBuffer> {
        let s = &self.settings;
        let (sigma_color, sigma_space) = s.bilateral_sigmas();
        let (kmin, kmax) = (s.min_kernel_size as f32, s.max_kernel_size as f32);

        let denoised = image.zip_planes(std_norm, |_, plane, sn| {
            let diameters: Vec<u32> = sn
                .data()
                .iter()
                .map(|&v| {
                    let k = (kmin + (kmax - kmin) * (1.0 - v)).round() as u32;
                    if k % 2 == 0 { k + 1 } else { k }
                })
                .collect();
            adaptive_bilateral(plane, &diameters, sigma_color, sigma_space)
        })?;
        let keep_original = std_norm.map_planes(|_, sn| Ok(sn.map(|n| n * s.denoise_blend_factor)))?;
        denoised.blend_with(image, &keep_original)
    }

    /// Mean-centred contrast stretch weighted by entropy, plus a deviation
    /// term that restores local contrast.
    fn adaptive_contrast(
        &self,
        image: &FloatBuffer,
        stats: &LocalStatsMap,
        std_norm: &FloatBuffer,
    ) -> Result<FloatBuffer> {
        let s = &self.settings;
        let entropy = stats.entropy.data();
        image.zip_planes(&stats.mean, |c, plane, mean| {
            let sn = std_norm.planes()[c].data();
            let (w, h) = plane.dimensions();
            let data = plane
                .data()
                .iter()
                .zip(mean.data())
                .enumerate()
                .map(|(i, (&v, &m))| {
                    let nm = m / 255.0;
                    let factor = s.alpha * (1.0 + s.gamma * entropy[i]);
                    let e = nm + factor * (v / 255.0 - nm);
                    let e = e + s.beta * (1.0 - e) * sn[i];
                    e * 255.0
                })
                .collect();
            Plane::from_vec(w, h, data)
        })
    }

    /// Unsharp mask blended in proportionally to local deviation.
    fn enhance_details(&self, image: &FloatBuffer, std_norm: &FloatBuffer) -> Result<FloatBuffer> {
        let s = &self.settings;
        let sharpened = image.map_planes(|_, plane| {
            unsharp_mask(
                plane,
                s.unsharp_kernel_size,
                s.unsharp_sigma,
                s.unsharp_amount,
                s.unsharp_threshold,
            )
        })?;
        image.blend_with(&sharpened, std_norm)
    }

    /// CLAHE blend then high-boost blend, each computed from the clipped
    /// image and mixed into the unclipped one.
    fn final_adjustments(&self, image: &FloatBuffer) -> Result<FloatBuffer> {
        let s = &self.settings;
        let mut image = image.clone();

        if s.apply_clahe {
            let equalised = clahe(&image.clip_and_normalize(), s.clahe_clip_limit, s.clahe_tile_grid)?;
            image = image.blend_uniform(&equalised, s.clahe_blend)?;
        }

        if s.apply_high_boost {
            let boosted = image
                .clip_and_normalize()
                .map_planes(|_, plane| high_boost(plane, s.high_boost_kernel_size, s.high_boost_factor))?;
            image = image.blend_uniform(&boosted, s.high_boost_blend)?;
        }

        Ok(image)
    }
}
