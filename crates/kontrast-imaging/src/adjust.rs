// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Photographic colour filters: brightness/contrast, exposure, vibrance,
// clarity, shadows/highlights and a single-frame HDR tone map.
//
// Slider-style parameters run from -100 to 100 (or 0 to 100) and are scaled
// internally. Luminance filters work on the Y channel of YCbCr so colour
// inputs keep their chroma.

use std::fmt;
use std::str::FromStr;

use kontrast_core::ParameterBag;
use kontrast_core::error::{KontrastError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::buffer::{Channels, FloatBuffer, PixelBuffer, Plane};
use crate::clahe::{from_ycbcr, to_ycbcr};
use crate::filters::gaussian_blur;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::settings::{number_in, size_in};

/// Drago bias; lower values compress highlights harder.
const DRAGO_BIAS: f32 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColourFilter {
    BrightnessContrast,
    Exposure,
    Vibrance,
    Clarity,
    ShadowsHighlights,
    Hdr,
}

impl ColourFilter {
    pub const ALL: [ColourFilter; 6] = [
        Self::BrightnessContrast,
        Self::Exposure,
        Self::Vibrance,
        Self::Clarity,
        Self::ShadowsHighlights,
        Self::Hdr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::BrightnessContrast => "brightness_contrast",
            Self::Exposure => "exposure",
            Self::Vibrance => "vibrance",
            Self::Clarity => "clarity",
            Self::ShadowsHighlights => "shadows_highlights",
            Self::Hdr => "hdr",
        }
    }
}

impl fmt::Display for ColourFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColourFilter {
    type Err = KontrastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "brightness_contrast" | "brightness" | "contrast" => Ok(Self::BrightnessContrast),
            "exposure" => Ok(Self::Exposure),
            "vibrance" => Ok(Self::Vibrance),
            "clarity" => Ok(Self::Clarity),
            "shadows_highlights" | "shadows" | "highlights" => Ok(Self::ShadowsHighlights),
            "hdr" | "hdr_effect" => Ok(Self::Hdr),
            other => Err(KontrastError::InvalidInput(format!(
                "unknown colour filter '{other}'"
            ))),
        }
    }
}

/// Slider values for every filter. Out-of-range values are clamped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub brightness: f32,
    pub contrast: f32,
    pub exposure: f32,
    pub vibrance: f32,
    pub clarity: f32,
    pub shadows: f32,
    pub highlights: f32,
    pub hdr_strength: f32,
    /// Radius of the HDR local-contrast blur.
    pub hdr_radius: u32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self::from_bag(&ParameterBag::new())
    }
}

impl FilterSettings {
    pub fn from_bag(bag: &ParameterBag) -> Self {
        Self {
            brightness: number_in(bag, "brightness", 0.0, -100.0, 100.0) as f32,
            contrast: number_in(bag, "contrast", 0.0, -100.0, 100.0) as f32,
            exposure: number_in(bag, "exposure", 0.0, -100.0, 100.0) as f32,
            vibrance: number_in(bag, "vibrance", 50.0, 0.0, 100.0) as f32,
            clarity: number_in(bag, "clarity", 50.0, 0.0, 100.0) as f32,
            shadows: number_in(bag, "shadows", 50.0, 0.0, 100.0) as f32,
            highlights: number_in(bag, "highlights", 50.0, 0.0, 100.0) as f32,
            hdr_strength: number_in(bag, "strength", 50.0, 0.0, 100.0) as f32,
            hdr_radius: size_in(bag, "radius", 20, 1, 100),
        }
    }
}

/// Run `filter` on `input`. The output has the same shape as the input.
#[instrument(skip(input, settings, progress), fields(filter = %filter, width = input.width(), height = input.height()))]
pub fn apply_filter(
    input: &PixelBuffer,
    filter: ColourFilter,
    settings: &FilterSettings,
    progress: &dyn ProgressSink,
) -> Result<PixelBuffer> {
    let mut reporter = ProgressReporter::new(progress);
    reporter.report(0.1);
    let output = match filter {
        ColourFilter::BrightnessContrast => {
            brightness_contrast(input, settings.brightness, settings.contrast)
        }
        ColourFilter::Exposure => exposure(input, settings.exposure),
        ColourFilter::Vibrance => vibrance(input, settings.vibrance / 100.0),
        ColourFilter::Clarity => clarity(input, settings.clarity / 100.0),
        ColourFilter::ShadowsHighlights => on_luma(input, |y| {
            Ok(shadows_highlights(
                y,
                settings.shadows / 100.0,
                settings.highlights / 100.0,
            ))
        }),
        ColourFilter::Hdr => on_luma(input, |y| {
            hdr(y, settings.hdr_strength / 100.0, settings.hdr_radius)
        }),
    }
    .map_err(|e| e.in_stage(filter.name()))?;
    reporter.report(1.0);
    debug!(%filter, "colour filter finished");
    Ok(output)
}

fn lookup(input: &PixelBuffer, table: &[u8; 256]) -> Result<PixelBuffer> {
    let data = input.data().iter().map(|&v| table[v as usize]).collect();
    PixelBuffer::new(input.width(), input.height(), input.channels(), data)
}

/// `|alpha * v + beta|`, saturated. Positive contrast stretches faster than
/// negative contrast flattens.
pub fn brightness_contrast(input: &PixelBuffer, brightness: f32, contrast: f32) -> Result<PixelBuffer> {
    let alpha = if contrast > 0.0 {
        1.0 + contrast / 100.0
    } else {
        1.0 + contrast / 127.0
    };
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = (alpha * i as f32 + brightness).abs().round().min(255.0) as u8;
    }
    lookup(input, &table)
}

/// Gamma curve driven by the exposure slider: positive values lift the
/// midtones, negative values darken them.
pub fn exposure(input: &PixelBuffer, exposure: f32) -> Result<PixelBuffer> {
    let gamma = if exposure > 0.0 {
        (1.0 - exposure / 100.0).max(0.01)
    } else {
        1.0 + exposure.abs() / 50.0
    };
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = ((i as f32 / 255.0).powf(gamma) * 255.0) as u8;
    }
    lookup(input, &table)
}

/// Raise saturation in proportion to how unsaturated a pixel already is.
/// Hue and value are kept. Gray inputs pass through.
pub fn vibrance(input: &PixelBuffer, amount: f32) -> Result<PixelBuffer> {
    if input.channels() == Channels::Gray || amount <= 0.0 {
        return Ok(input.clone());
    }
    let mut data = input.data().to_vec();
    for px in data.chunks_exact_mut(3) {
        let max = px.iter().copied().max().unwrap_or(0) as f32;
        let min = px.iter().copied().min().unwrap_or(0) as f32;
        if max <= 0.0 || max == min {
            continue;
        }
        let s = (max - min) / max * 255.0;
        let boosted = (s + (255.0 - s) / 255.0 * s * amount).min(255.0);
        let ratio = boosted / s;
        for c in px.iter_mut() {
            *c = (max - (max - *c as f32) * ratio).round().clamp(0.0, 255.0) as u8;
        }
    }
    PixelBuffer::new(input.width(), input.height(), input.channels(), data)
}

/// Midtone contrast: subtract a scaled Gaussian blur whose width grows with
/// `amount`.
pub fn clarity(input: &PixelBuffer, amount: f32) -> Result<PixelBuffer> {
    let kernel = (10.0 * amount) as u32 * 2 + 1;
    if kernel <= 1 {
        return Ok(input.clone());
    }
    FloatBuffer::from_pixels(input)
        .map_planes(|_, plane| {
            let blurred = gaussian_blur(plane, kernel, 0.0)?;
            plane.zip_map(&blurred, |v, b| (1.0 + amount) * v - amount * b)
        })?
        .to_pixels()
}

/// Apply `f` to the luminance of `input`, keeping chroma for colour inputs.
fn on_luma(input: &PixelBuffer, f: impl Fn(&Plane) -> Result<Plane>) -> Result<PixelBuffer> {
    let planes = FloatBuffer::from_pixels(input).into_planes();
    let out = match planes.as_slice() {
        [gray] => vec![f(gray)?],
        [r, g, b] => {
            let (y, cb, cr) = to_ycbcr(r, g, b)?;
            let (r, g, b) = from_ycbcr(&f(&y)?, &cb, &cr)?;
            vec![r, g, b]
        }
        other => {
            return Err(KontrastError::InvalidInput(format!(
                "unsupported channel count {}",
                other.len()
            )));
        }
    };
    FloatBuffer::from_planes(out)?.to_pixels()
}

/// Lift dark tones and pull down bright ones, each weighted by a quadratic
/// falloff so the opposite end is barely touched.
pub fn shadows_highlights(luma: &Plane, shadows: f32, highlights: f32) -> Plane {
    luma.map(|l| {
        let lifted = l + (1.0 - l / 255.0).powi(2) * shadows * 100.0;
        let l = lifted.clamp(0.0, 255.0);
        (l - (l / 255.0).powi(2) * highlights * 100.0).clamp(0.0, 255.0)
    })
}

/// Drago logarithmic tone map blended with the input, followed by a
/// local-contrast boost over a `2 * radius + 1` window.
pub fn hdr(luma: &Plane, strength: f32, radius: u32) -> Result<Plane> {
    if strength <= 0.0 || luma.is_empty() {
        return Ok(luma.clone());
    }
    let n = luma.data().len() as f32;
    let log_mean = (luma
        .data()
        .iter()
        .map(|&v| (1e-4 + v / 255.0).ln())
        .sum::<f32>()
        / n)
        .exp();
    let scaled = luma.map(|v| v / 255.0 / log_mean);
    let peak = scaled.max().max(f32::EPSILON);
    let exponent = DRAGO_BIAS.ln() / 0.5f32.ln();
    let mapped = scaled.map(|g| (g + 1.0).ln() / (2.0 + 8.0 * (g / peak).powf(exponent)).ln());
    let mapped_peak = mapped.max().max(f32::EPSILON);

    let toned = luma.zip_map(&mapped, |l, m| {
        (1.0 - strength) * l + strength * (m / mapped_peak) * 255.0
    })?;
    let blurred = gaussian_blur(&toned, 2 * radius + 1, 0.0)?;
    let detail = strength / 2.0;
    toned.zip_map(&blurred, |v, b| (1.0 + detail) * v - detail * b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    fn gray(values: &[u8]) -> PixelBuffer {
        PixelBuffer::new(values.len() as u32, 1, Channels::Gray, values.to_vec()).expect("buffer")
    }

    fn ramp(width: u32, height: u32) -> PixelBuffer {
        let data = (0..width * height).map(|i| (i * 255 / (width * height - 1)) as u8).collect();
        PixelBuffer::new(width, height, Channels::Gray, data).expect("buffer")
    }

    #[test]
    fn filter_names_parse() {
        for filter in ColourFilter::ALL {
            assert_eq!(filter.name().parse::<ColourFilter>().expect("parse"), filter);
            let json = serde_json::to_string(&filter).expect("serialize");
            assert_eq!(json, format!("\"{}\"", filter.name()));
        }
        assert!("sepia".parse::<ColourFilter>().is_err());
    }

    #[test]
    fn brightness_and_contrast_follow_their_sliders() {
        let input = gray(&[0, 100, 200]);
        assert_eq!(brightness_contrast(&input, 0.0, 0.0).expect("bc").data(), &[0, 100, 200]);
        assert_eq!(brightness_contrast(&input, 50.0, 0.0).expect("bc").data(), &[50, 150, 250]);
        // alpha = 2 doubles and saturates.
        assert_eq!(brightness_contrast(&input, 0.0, 100.0).expect("bc").data(), &[0, 200, 255]);
        // Negative results fold back to their magnitude.
        assert_eq!(brightness_contrast(&input, -50.0, 0.0).expect("bc").data(), &[50, 50, 150]);
    }

    #[test]
    fn exposure_brightens_or_darkens_midtones() {
        let input = gray(&[0, 128, 255]);
        let up = exposure(&input, 50.0).expect("exposure");
        let down = exposure(&input, -50.0).expect("exposure");
        assert!(up.data()[1] > 128);
        assert!(down.data()[1] < 128);
        for out in [&up, &down] {
            assert_eq!((out.data()[0], out.data()[2]), (0, 255));
        }
        let flat = exposure(&input, 0.0).expect("exposure");
        assert!((127..=128).contains(&flat.data()[1]));
    }

    #[test]
    fn vibrance_boosts_muted_colour_and_keeps_value() {
        let input = PixelBuffer::new(2, 1, Channels::Rgb, vec![150, 120, 120, 90, 90, 90])
            .expect("buffer");
        let out = vibrance(&input, 0.5).expect("vibrance");
        let px = &out.data()[..3];
        assert_eq!(px[0], 150);
        assert!(px[1] < 120 && px[1] == px[2]);
        // Neutral pixels have no hue to boost.
        assert_eq!(&out.data()[3..], &[90, 90, 90]);

        let g = gray(&[10, 20]);
        assert_eq!(vibrance(&g, 1.0).expect("vibrance"), g);
    }

    #[test]
    fn clarity_steepens_edges_and_zero_is_identity() {
        let input = PixelBuffer::new(
            8,
            1,
            Channels::Gray,
            vec![50, 50, 50, 50, 200, 200, 200, 200],
        )
        .expect("buffer");
        let out = clarity(&input, 0.5).expect("clarity");
        assert!(out.data()[3] < 50);
        assert!(out.data()[4] > 200);
        assert_eq!(clarity(&input, 0.0).expect("clarity"), input);
    }

    #[test]
    fn shadows_lift_dark_and_highlights_pull_bright() {
        let plane = Plane::from_vec(3, 1, vec![0.0, 128.0, 255.0]).expect("plane");
        let lifted = shadows_highlights(&plane, 0.5, 0.0);
        assert_eq!(lifted.get(0, 0), 50.0);
        assert_eq!(lifted.get(2, 0), 255.0);
        let pulled = shadows_highlights(&plane, 0.0, 0.5);
        assert_eq!(pulled.get(0, 0), 0.0);
        assert_eq!(pulled.get(2, 0), 205.0);
    }

    #[test]
    fn hdr_keeps_shape_and_zero_strength_is_identity() {
        let input = ramp(16, 16);
        let settings = FilterSettings::from_bag(&ParameterBag::new().with("strength", 0.0));
        let same = apply_filter(&input, ColourFilter::Hdr, &settings, &NoProgress).expect("hdr");
        assert_eq!(same, input);

        let strong = FilterSettings::from_bag(&ParameterBag::new().with("strength", 80.0));
        let out = apply_filter(&input, ColourFilter::Hdr, &strong, &NoProgress).expect("hdr");
        assert_eq!(out.dimensions(), input.dimensions());
        // The log curve lifts the darker half of the ramp.
        let mid = (8 * 16) as usize;
        assert!(out.data()[mid / 2] > input.data()[mid / 2]);
    }

    #[test]
    fn colour_inputs_keep_their_shape_for_every_filter() {
        let data = (0..12 * 12 * 3).map(|i| (i * 7 % 256) as u8).collect();
        let input = PixelBuffer::new(12, 12, Channels::Rgb, data).expect("buffer");
        let settings = FilterSettings::default();
        for filter in ColourFilter::ALL {
            let out = apply_filter(&input, filter, &settings, &NoProgress).expect("filter");
            assert_eq!(out.dimensions(), input.dimensions());
            assert_eq!(out.channels(), Channels::Rgb);
        }
    }

    #[test]
    fn defaults_and_clamping() {
        let settings = FilterSettings::from_bag(
            &ParameterBag::new().with("brightness", 500.0).with("radius", 0.0),
        );
        assert_eq!(settings.brightness, 100.0);
        assert_eq!(settings.hdr_radius, 1);
        assert_eq!(settings.vibrance, 50.0);
    }
}
