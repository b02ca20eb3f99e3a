// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Binary images, structuring elements and the primitive set operations
// (erode, dilate, open, hit-or-miss) the morphology algorithms are built on.

use std::str::FromStr;

use image::{GrayImage, Luma};
use kontrast_core::error::{KontrastError, Result};
use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;

/// How samples outside the image are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    Background,
    Foreground,
}

// ---------------------------------------------------------------------------
// BinaryImage
// ---------------------------------------------------------------------------

/// A single-channel image where every pixel is foreground or background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryImage {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl BinaryImage {
    /// All-background image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width as usize * height as usize],
        }
    }

    /// Build from rows of `#`/`1` (foreground) and anything else (background).
    pub fn from_rows(rows: &[&str]) -> Result<Self> {
        let height = rows.len() as u32;
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0) as u32;
        if rows.iter().any(|r| r.chars().count() as u32 != width) {
            return Err(KontrastError::InvalidInput("ragged binary image rows".into()));
        }
        let pixels = rows
            .iter()
            .flat_map(|r| r.chars().map(|c| c == '#' || c == '1'))
            .collect();
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Binarise the luminance of `buffer`: samples strictly above `threshold`
    /// become foreground.
    pub fn threshold(buffer: &PixelBuffer, threshold: u8) -> Self {
        let gray = buffer.luma();
        Self {
            width: gray.width(),
            height: gray.height(),
            pixels: gray.as_raw().iter().map(|&v| v > threshold).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Pixel lookup that answers according to `border` outside the image.
    pub fn get_or(&self, x: i64, y: i64, border: Border) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return border == Border::Foreground;
        }
        self.get(x as u32, y as u32)
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.pixels[y as usize * self.width as usize + x as usize] = value;
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }

    /// True when no pixel is foreground.
    pub fn is_empty(&self) -> bool {
        !self.pixels.iter().any(|&p| p)
    }

    pub fn pixels(&self) -> &[bool] {
        &self.pixels
    }

    pub fn invert(&self) -> Self {
        self.map(|p| !p)
    }

    pub fn union(&self, other: &Self) -> Self {
        self.zip(other, |a, b| a || b)
    }

    pub fn intersect(&self, other: &Self) -> Self {
        self.zip(other, |a, b| a && b)
    }

    /// Pixels set here but not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        self.zip(other, |a, b| a && !b)
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.pixels
            .iter()
            .zip(&other.pixels)
            .all(|(&a, &b)| !a || b)
    }

    /// Foreground as 255, background as 0.
    pub fn to_gray(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    fn map(&self, f: impl Fn(bool) -> bool) -> Self {
        Self {
            width: self.width,
            height: self.height,
            pixels: self.pixels.iter().map(|&p| f(p)).collect(),
        }
    }

    fn zip(&self, other: &Self, f: impl Fn(bool, bool) -> bool) -> Self {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        Self {
            width: self.width,
            height: self.height,
            pixels: self
                .pixels
                .iter()
                .zip(&other.pixels)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// StructuringElement
// ---------------------------------------------------------------------------

/// An odd-sized mask of set cells, anchored at its centre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuringElement {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl StructuringElement {
    pub fn new(width: u32, height: u32, cells: Vec<bool>) -> Result<Self> {
        if width % 2 == 0 || height % 2 == 0 {
            return Err(KontrastError::stage(
                "structuring_element",
                format!("dimensions must be odd, got {width}x{height}"),
            ));
        }
        if cells.len() != width as usize * height as usize {
            return Err(KontrastError::stage(
                "structuring_element",
                format!("{width}x{height} element needs {} cells", width * height),
            ));
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Parse rows such as `["010", "111", "010"]`.
    pub fn from_rows(rows: &[&str]) -> Result<Self> {
        let height = rows.len() as u32;
        let width = rows.first().map(|r| r.len()).unwrap_or(0) as u32;
        if rows.iter().any(|r| r.len() as u32 != width) {
            return Err(KontrastError::stage(
                "structuring_element",
                "ragged structuring element rows",
            ));
        }
        let cells = rows
            .iter()
            .flat_map(|r| r.chars().map(|c| c == '1' || c == '#'))
            .collect();
        Self::new(width, height, cells)
    }

    /// 3x3 plus-shaped element.
    pub fn cross() -> Self {
        Self {
            width: 3,
            height: 3,
            cells: vec![false, true, false, true, true, true, false, true, false],
        }
    }

    /// Square element of `size` x `size` with cells chosen by `f(row, col)`.
    pub fn square_with(size: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let size = if size % 2 == 0 { size + 1 } else { size };
        let cells = (0..size)
            .flat_map(|r| (0..size).map(move |c| (r, c)))
            .map(|(r, c)| f(r, c))
            .collect();
        Self {
            width: size,
            height: size,
            cells,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|&c| c)
    }

    /// Offsets of the set cells relative to the centre.
    pub fn offsets(&self) -> Vec<(i64, i64)> {
        let (cx, cy) = ((self.width / 2) as i64, (self.height / 2) as i64);
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .map(|(i, _)| {
                let i = i as i64;
                (i % self.width as i64 - cx, i / self.width as i64 - cy)
            })
            .collect()
    }

    /// True if any cell is set in both elements.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.cells.iter().zip(&other.cells).any(|(&a, &b)| a && b)
    }

    /// Copy with every cell also set in `other` cleared.
    pub fn without(&self, other: &Self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            cells: self
                .cells
                .iter()
                .zip(&other.cells)
                .map(|(&a, &b)| a && !b)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Primitive operations
// ---------------------------------------------------------------------------

/// A pixel survives when every set cell of `se` lands on foreground.
pub fn erode(image: &BinaryImage, se: &StructuringElement, border: Border) -> BinaryImage {
    let offsets = se.offsets();
    let mut out = BinaryImage::new(image.width, image.height);
    for y in 0..image.height {
        for x in 0..image.width {
            let hit = offsets
                .iter()
                .all(|&(dx, dy)| image.get_or(x as i64 + dx, y as i64 + dy, border));
            out.set(x, y, hit);
        }
    }
    out
}

/// A pixel is set when the reflected element touches any foreground pixel.
pub fn dilate(image: &BinaryImage, se: &StructuringElement) -> BinaryImage {
    let offsets = se.offsets();
    let mut out = BinaryImage::new(image.width, image.height);
    for y in 0..image.height {
        for x in 0..image.width {
            let hit = offsets.iter().any(|&(dx, dy)| {
                image.get_or(x as i64 - dx, y as i64 - dy, Border::Background)
            });
            out.set(x, y, hit);
        }
    }
    out
}

/// Erosion followed by dilation.
pub fn open(image: &BinaryImage, se: &StructuringElement) -> BinaryImage {
    dilate(&erode(image, se, Border::Background), se)
}

/// Hit-or-miss transform: pixels whose neighbourhood matches `hit` on the
/// foreground and `miss` on the background. Outside the image counts as
/// background for both.
pub fn hit_or_miss(
    image: &BinaryImage,
    hit: &StructuringElement,
    miss: &StructuringElement,
) -> Result<BinaryImage> {
    if hit.dimensions() != miss.dimensions() {
        return Err(KontrastError::stage(
            "hit_or_miss",
            format!(
                "hit {:?} and miss {:?} elements differ in size",
                hit.dimensions(),
                miss.dimensions()
            ),
        ));
    }
    if hit.is_empty() {
        return Err(KontrastError::stage("hit_or_miss", "hit element has no set cells"));
    }
    if hit.overlaps(miss) {
        return Err(KontrastError::stage(
            "hit_or_miss",
            "hit and miss elements overlap",
        ));
    }
    let fits = erode(image, hit, Border::Background);
    let misses = erode(&image.invert(), miss, Border::Foreground);
    Ok(fits.intersect(&misses))
}

// ---------------------------------------------------------------------------
// Pattern catalogue
// ---------------------------------------------------------------------------

/// Named hit/miss element pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitMissPattern {
    /// Centre row and column hit; corners miss.
    Cross,
    /// Centre row hits; top and bottom rows miss.
    Horizontal,
    /// Centre column hits; left and right columns miss.
    Vertical,
    /// Main diagonal hits; anti-diagonal (minus the centre) misses.
    Diagonal,
}

impl HitMissPattern {
    /// Hit and miss elements of `size` x `size` (forced odd, at least 3).
    pub fn elements(self, size: u32) -> (StructuringElement, StructuringElement) {
        let size = size.max(3);
        let n = if size % 2 == 0 { size + 1 } else { size };
        let mid = n / 2;
        let last = n - 1;
        let (hit, miss) = match self {
            Self::Cross => (
                StructuringElement::square_with(n, |r, c| r == mid || c == mid),
                StructuringElement::square_with(n, |r, c| {
                    (r == 0 || r == last) && (c == 0 || c == last)
                }),
            ),
            Self::Horizontal => (
                StructuringElement::square_with(n, |r, _| r == mid),
                StructuringElement::square_with(n, |r, _| r == 0 || r == last),
            ),
            Self::Vertical => (
                StructuringElement::square_with(n, |_, c| c == mid),
                StructuringElement::square_with(n, |_, c| c == 0 || c == last),
            ),
            Self::Diagonal => (
                StructuringElement::square_with(n, |r, c| r == c),
                StructuringElement::square_with(n, |r, c| r + c == last),
            ),
        };
        let miss = miss.without(&hit);
        (hit, miss)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Cross => "cross",
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
            Self::Diagonal => "diagonal",
        }
    }
}

impl FromStr for HitMissPattern {
    type Err = KontrastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cross" => Ok(Self::Cross),
            "horizontal" => Ok(Self::Horizontal),
            "vertical" => Ok(Self::Vertical),
            "diagonal" => Ok(Self::Diagonal),
            other => Err(KontrastError::InvalidInput(format!(
                "unknown hit-or-miss pattern '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Channels;

    #[test]
    fn threshold_is_strictly_greater() {
        let buffer =
            PixelBuffer::new(3, 1, Channels::Gray, vec![127, 128, 255]).expect("buffer");
        let binary = BinaryImage::threshold(&buffer, 127);
        assert_eq!(binary.pixels(), &[false, true, true]);
    }

    #[test]
    fn erode_then_dilate_square_with_cross() {
        let image = BinaryImage::from_rows(&[
            ".....", //
            ".###.", //
            ".###.", //
            ".###.", //
            ".....",
        ])
        .expect("image");
        let eroded = erode(&image, &StructuringElement::cross(), Border::Background);
        assert_eq!(eroded.count(), 1);
        assert!(eroded.get(2, 2));
        let dilated = dilate(&eroded, &StructuringElement::cross());
        assert_eq!(dilated.count(), 5);
    }

    #[test]
    fn outside_counts_as_background_when_eroding() {
        let full = BinaryImage::from_rows(&["###", "###", "###"]).expect("image");
        let eroded = erode(&full, &StructuringElement::cross(), Border::Background);
        assert_eq!(eroded.count(), 1);
        let kept = erode(&full, &StructuringElement::cross(), Border::Foreground);
        assert_eq!(kept.count(), 9);
    }

    #[test]
    fn element_validation() {
        assert!(StructuringElement::from_rows(&["11", "11"]).is_err());
        assert!(StructuringElement::from_rows(&["111", "11"]).is_err());
        let err = StructuringElement::new(3, 3, vec![true; 4]).unwrap_err();
        assert!(matches!(err, KontrastError::StageFailure { .. }));
    }

    #[test]
    fn hit_or_miss_rejects_malformed_pairs() {
        let image = BinaryImage::new(5, 5);
        let cross = StructuringElement::cross();
        assert!(hit_or_miss(&image, &cross, &cross).is_err());
        let empty = StructuringElement::square_with(3, |_, _| false);
        assert!(hit_or_miss(&image, &empty, &cross).is_err());
        let big = StructuringElement::square_with(5, |r, _| r == 0);
        assert!(hit_or_miss(&image, &cross, &big).is_err());
    }

    #[test]
    fn horizontal_pattern_finds_isolated_line() {
        let image = BinaryImage::from_rows(&[
            ".......", //
            ".#####.", //
            ".......",
        ])
        .expect("image");
        let (hit, miss) = HitMissPattern::Horizontal.elements(3);
        let found = hit_or_miss(&image, &hit, &miss).expect("transform");
        // Interior of the line matches; its ends lack a left/right neighbour.
        assert_eq!(found.count(), 3);
        assert!(found.get(2, 1) && found.get(3, 1) && found.get(4, 1));
    }

    #[test]
    fn catalogue_pairs_never_overlap() {
        for pattern in [
            HitMissPattern::Cross,
            HitMissPattern::Horizontal,
            HitMissPattern::Vertical,
            HitMissPattern::Diagonal,
        ] {
            for size in [3, 4, 7] {
                let (hit, miss) = pattern.elements(size);
                assert!(!hit.overlaps(&miss), "{}", pattern.name());
                assert_eq!(hit.dimensions().0 % 2, 1);
            }
            assert_eq!(pattern.name().parse::<HitMissPattern>().expect("parse"), pattern);
        }
    }
}
