// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pixel buffers: the 8-bit interleaved buffer exchanged with callers and the
// planar f32 buffer the pipeline stages work on.
//
// Dimensions only change at explicit resize calls; everything else maps a
// buffer to a new buffer of the same shape.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbImage};
use kontrast_core::error::{KontrastError, Result};

/// Number of interleaved channels in a `PixelBuffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Gray,
    Rgb,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
        }
    }

    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(Self::Gray),
            3 => Ok(Self::Rgb),
            other => Err(KontrastError::InvalidInput(format!(
                "unsupported channel count {other} (expected 1 or 3)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PixelBuffer
// ---------------------------------------------------------------------------

/// Owned, contiguous 8-bit image of shape (height, width, channels).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: Channels,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap interleaved pixel data, checking that it matches the shape.
    pub fn new(width: u32, height: u32, channels: Channels, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(KontrastError::InvalidInput(format!(
                "buffer dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * channels.count();
        if data.len() != expected {
            return Err(KontrastError::InvalidInput(format!(
                "buffer of {width}x{height}x{} needs {expected} bytes, got {}",
                channels.count(),
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// A buffer with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: Channels, value: u8) -> Result<Self> {
        let len = width as usize * height as usize * channels.count();
        Self::new(width, height, channels, vec![value; len])
    }

    /// Convert a decoded image. Images without colour information become
    /// single-channel; everything else becomes RGB (alpha is dropped).
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        if image.color().has_color() {
            Self::from_rgb(image.to_rgb8())
        } else {
            Self::from_gray(image.to_luma8())
        }
    }

    pub fn from_gray(image: GrayImage) -> Result<Self> {
        let (w, h) = image.dimensions();
        Self::new(w, h, Channels::Gray, image.into_raw())
    }

    pub fn from_rgb(image: RgbImage) -> Result<Self> {
        let (w, h) = image.dimensions();
        Self::new(w, h, Channels::Rgb, image.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> Channels {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Sample at (x, y) in channel `c`.
    pub fn sample(&self, x: u32, y: u32, c: usize) -> u8 {
        let n = self.channels.count();
        self.data[(y as usize * self.width as usize + x as usize) * n + c]
    }

    /// Convert into an `image` crate value (for encoding).
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        let data = self.data.clone();
        let image = match self.channels {
            Channels::Gray => GrayImage::from_raw(self.width, self.height, data)
                .map(DynamicImage::ImageLuma8),
            Channels::Rgb => RgbImage::from_raw(self.width, self.height, data)
                .map(DynamicImage::ImageRgb8),
        };
        image.ok_or_else(|| KontrastError::InvalidInput("buffer/shape mismatch".into()))
    }

    /// 8-bit luminance (BT.601 weights). Gray buffers are copied as-is.
    pub fn luma(&self) -> GrayImage {
        match self.channels {
            Channels::Gray => {
                GrayImage::from_fn(self.width, self.height, |x, y| Luma([self.sample(x, y, 0)]))
            }
            Channels::Rgb => GrayImage::from_fn(self.width, self.height, |x, y| {
                let r = self.sample(x, y, 0) as f32;
                let g = self.sample(x, y, 1) as f32;
                let b = self.sample(x, y, 2) as f32;
                Luma([luma_of(r, g, b).round().clamp(0.0, 255.0) as u8])
            }),
        }
    }

    /// Each channel as its own 8-bit image.
    pub fn split_channels(&self) -> Vec<GrayImage> {
        (0..self.channels.count())
            .map(|c| GrayImage::from_fn(self.width, self.height, |x, y| Luma([self.sample(x, y, c)])))
            .collect()
    }

    /// Interleave one image per channel back into a buffer.
    pub fn merge_channels(channels: &[GrayImage]) -> Result<Self> {
        let kind = Channels::from_count(channels.len())?;
        let (width, height) = channels[0].dimensions();
        if channels.iter().any(|c| c.dimensions() != (width, height)) {
            return Err(KontrastError::InvalidInput("channel images differ in size".into()));
        }
        let n = channels.len();
        let mut data = vec![0u8; width as usize * height as usize * n];
        for (c, image) in channels.iter().enumerate() {
            for (i, &v) in image.as_raw().iter().enumerate() {
                data[i * n + c] = v;
            }
        }
        Self::new(width, height, kind, data)
    }

    /// Area-style resample to exactly `width` x `height`.
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(KontrastError::InvalidInput(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        match self.channels {
            Channels::Gray => {
                let src = GrayImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| KontrastError::InvalidInput("buffer/shape mismatch".into()))?;
                Self::from_gray(image::imageops::resize(&src, width, height, FilterType::Triangle))
            }
            Channels::Rgb => {
                let src = RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(|| KontrastError::InvalidInput("buffer/shape mismatch".into()))?;
                Self::from_rgb(image::imageops::resize(&src, width, height, FilterType::Triangle))
            }
        }
    }
}

/// BT.601 luminance.
pub fn luma_of(r: f32, g: f32, b: f32) -> f32 {
    0.299 * r + 0.587 * g + 0.114 * b
}

// ---------------------------------------------------------------------------
// Plane
// ---------------------------------------------------------------------------

/// A single channel of f32 samples in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl Plane {
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(KontrastError::InvalidInput(format!(
                "plane of {width}x{height} needs {} samples, got {}",
                width as usize * height as usize,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_gray(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Sample with reflect-border addressing (`cba|abc|cba`).
    pub fn get_reflected(&self, x: i64, y: i64) -> f32 {
        let xr = reflect_index(x, self.width as usize);
        let yr = reflect_index(y, self.height as usize);
        self.data[yr * self.width as usize + xr]
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two planes of the same shape sample by sample.
    pub fn zip_map(&self, other: &Plane, f: impl Fn(f32, f32) -> f32) -> Result<Self> {
        if self.dimensions() != other.dimensions() {
            return Err(KontrastError::InvalidInput(format!(
                "plane shapes differ: {:?} vs {:?}",
                self.dimensions(),
                other.dimensions()
            )));
        }
        Ok(Self {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Clamp to [0, 255] and round to whole intensity levels.
    pub fn clip_and_normalize(&self) -> Self {
        self.map(clip_sample)
    }

    /// Quantise to an 8-bit image (clipping first).
    pub fn to_gray(&self) -> GrayImage {
        let bytes = self.data.iter().map(|&v| clip_sample(v) as u8).collect();
        GrayImage::from_raw(self.width, self.height, bytes)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Linear resample to `width` x `height`. Samples are clamped to
    /// [0, 255] on the way through.
    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(KontrastError::InvalidInput(format!(
                "cannot resize to {width}x{height}"
            )));
        }
        // The float resampler clamps to [0, 1], so work in unit range.
        let unit: Vec<f32> = self.data.iter().map(|&v| v / 255.0).collect();
        let src: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(self.width, self.height, unit)
                .ok_or_else(|| KontrastError::InvalidInput("plane/shape mismatch".into()))?;
        let resized = image::imageops::resize(&src, width, height, FilterType::Triangle);
        Self::from_vec(
            width,
            height,
            resized.into_raw().into_iter().map(|v| v * 255.0).collect(),
        )
    }
}

fn clip_sample(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 255.0).round()
    }
}

/// Mirror an out-of-range index back into `0..len`, duplicating the edge
/// sample. Works for offsets larger than the axis itself.
pub fn reflect_index(i: i64, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let n = len as i64;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m >= n {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}

// ---------------------------------------------------------------------------
// FloatBuffer
// ---------------------------------------------------------------------------

/// Planar f32 image used between pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatBuffer {
    planes: Vec<Plane>,
}

impl FloatBuffer {
    /// Build from planes of identical shape; 1 or 3 planes only.
    pub fn from_planes(planes: Vec<Plane>) -> Result<Self> {
        Channels::from_count(planes.len())?;
        let dims = planes[0].dimensions();
        if planes.iter().any(|p| p.dimensions() != dims) {
            return Err(KontrastError::InvalidInput(
                "all planes of a buffer must share one shape".into(),
            ));
        }
        Ok(Self { planes })
    }

    /// Deinterleave an 8-bit buffer into float planes.
    pub fn from_pixels(buffer: &PixelBuffer) -> Self {
        let n = buffer.channels().count();
        let planes = (0..n)
            .map(|c| Plane {
                width: buffer.width(),
                height: buffer.height(),
                data: buffer.data().iter().skip(c).step_by(n).map(|&v| v as f32).collect(),
            })
            .collect();
        Self { planes }
    }

    /// Clip, round, and interleave back into an 8-bit buffer.
    pub fn to_pixels(&self) -> Result<PixelBuffer> {
        let (width, height) = self.dimensions();
        let n = self.planes.len();
        let mut data = vec![0u8; width as usize * height as usize * n];
        for (c, plane) in self.planes.iter().enumerate() {
            for (i, &v) in plane.data.iter().enumerate() {
                data[i * n + c] = clip_sample(v) as u8;
            }
        }
        PixelBuffer::new(width, height, Channels::from_count(n)?, data)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.planes[0].dimensions()
    }

    pub fn channel_count(&self) -> usize {
        self.planes.len()
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn into_planes(self) -> Vec<Plane> {
        self.planes
    }

    /// Apply a single-channel transform to every plane and recombine.
    pub fn map_planes<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, &Plane) -> Result<Plane>,
    {
        let planes = self
            .planes
            .iter()
            .enumerate()
            .map(|(c, plane)| f(c, plane))
            .collect::<Result<Vec<_>>>()?;
        Self::from_planes(planes)
    }

    /// Per-plane combination with a second buffer of the same shape.
    pub fn zip_planes<F>(&self, other: &FloatBuffer, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, &Plane, &Plane) -> Result<Plane>,
    {
        if self.channel_count() != other.channel_count() {
            return Err(KontrastError::InvalidInput(format!(
                "channel counts differ: {} vs {}",
                self.channel_count(),
                other.channel_count()
            )));
        }
        self.map_planes(|c, plane| f(c, plane, &other.planes[c]))
    }

    /// `self * (1 - weight) + other * weight`, with a per-sample weight plane
    /// for each channel.
    pub fn blend_with(&self, other: &FloatBuffer, weights: &FloatBuffer) -> Result<Self> {
        if weights.dimensions() != self.dimensions() || other.dimensions() != self.dimensions() {
            return Err(KontrastError::InvalidInput(
                "blend operands must share one shape".into(),
            ));
        }
        self.zip_planes(other, |c, a, b| {
            let w = &weights.planes[c.min(weights.planes.len() - 1)];
            Plane::from_vec(
                a.width,
                a.height,
                a.data
                    .iter()
                    .zip(&b.data)
                    .zip(&w.data)
                    .map(|((&x, &y), &t)| x * (1.0 - t) + y * t)
                    .collect(),
            )
        })
    }

    /// Uniform blend: `self * (1 - amount) + other * amount`.
    pub fn blend_uniform(&self, other: &FloatBuffer, amount: f32) -> Result<Self> {
        self.zip_planes(other, |_, a, b| a.zip_map(b, |x, y| x * (1.0 - amount) + y * amount))
    }

    /// Clamp every sample to [0, 255] and round.
    pub fn clip_and_normalize(&self) -> Self {
        Self {
            planes: self.planes.iter().map(Plane::clip_and_normalize).collect(),
        }
    }

    pub fn resize(&self, width: u32, height: u32) -> Result<Self> {
        self.map_planes(|_, plane| plane.resize(width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_split_and_merge_back() {
        let data: Vec<u8> = (0..12).collect();
        let buffer = PixelBuffer::new(2, 2, Channels::Rgb, data).expect("buffer");
        let split = buffer.split_channels();
        assert_eq!(split.len(), 3);
        assert_eq!(split[1].as_raw(), &vec![1, 4, 7, 10]);
        assert_eq!(PixelBuffer::merge_channels(&split).expect("merge"), buffer);
        assert!(PixelBuffer::merge_channels(&split[..2]).is_err());
    }

    #[test]
    fn rejects_mismatched_data_length() {
        let err = PixelBuffer::new(4, 4, Channels::Rgb, vec![0; 10]).unwrap_err();
        assert!(matches!(err, KontrastError::InvalidInput(_)));
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(PixelBuffer::new(0, 4, Channels::Gray, vec![]).is_err());
    }

    #[test]
    fn float_roundtrip_preserves_interleaving() {
        let data: Vec<u8> = (0..12).collect();
        let buffer = PixelBuffer::new(2, 2, Channels::Rgb, data.clone()).expect("buffer");
        let float = FloatBuffer::from_pixels(&buffer);
        assert_eq!(float.channel_count(), 3);
        assert_eq!(float.planes()[1].data(), &[1.0, 4.0, 7.0, 10.0]);
        assert_eq!(float.to_pixels().expect("pixels").data(), data.as_slice());
    }

    #[test]
    fn reflect_index_mirrors_edges() {
        assert_eq!(reflect_index(-1, 5), 0);
        assert_eq!(reflect_index(-2, 5), 1);
        assert_eq!(reflect_index(5, 5), 4);
        assert_eq!(reflect_index(6, 5), 3);
        assert_eq!(reflect_index(2, 5), 2);
        // Offsets wider than the axis still land inside it.
        assert!(reflect_index(-13, 3) < 3);
        assert_eq!(reflect_index(7, 1), 0);
    }

    #[test]
    fn clip_and_normalize_is_idempotent() {
        let plane = Plane::from_vec(4, 1, vec![-20.0, 12.4, 254.6, 400.0]).expect("plane");
        let buffer = FloatBuffer::from_planes(vec![plane]).expect("buffer");
        let once = buffer.clip_and_normalize();
        let twice = once.clip_and_normalize();
        assert_eq!(once, twice);
        assert_eq!(once.planes()[0].data(), &[0.0, 12.0, 255.0, 255.0]);
    }

    #[test]
    fn resize_changes_only_dimensions_requested() {
        let buffer = PixelBuffer::filled(30, 20, Channels::Rgb, 90).expect("buffer");
        let small = buffer.resize(15, 10).expect("resize");
        assert_eq!(small.dimensions(), (15, 10));
        assert_eq!(small.channels(), Channels::Rgb);
        assert!(small.data().iter().all(|&v| v == 90));

        let float = FloatBuffer::from_pixels(&small);
        let big = float.resize(30, 20).expect("upscale");
        assert_eq!(big.dimensions(), (30, 20));
        assert!(big.planes()[0].data().iter().all(|&v| (v - 90.0).abs() < 0.5));
    }

    #[test]
    fn luma_of_gray_rgb_is_identity() {
        let buffer = PixelBuffer::filled(3, 3, Channels::Rgb, 77).expect("buffer");
        assert!(buffer.luma().pixels().all(|p| p.0[0] == 77));
    }
}
