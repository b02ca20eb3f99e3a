// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Directional thickening with four hit-or-miss element pairs.
//
// The hit elements leave the origin unset: a background pixel is added when
// the row/column on one side is fully foreground and the opposite side is
// fully background.

use kontrast_core::error::Result;
use tracing::debug;

use super::binary::{BinaryImage, StructuringElement, hit_or_miss};

/// Growth direction of one thickening element pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// (hit, miss) elements growing the foreground towards this side.
    pub fn elements(self) -> Result<(StructuringElement, StructuringElement)> {
        let (hit, miss) = match self {
            Self::North => (["000", "000", "111"], ["111", "000", "000"]),
            Self::South => (["111", "000", "000"], ["000", "000", "111"]),
            Self::East => (["100", "100", "100"], ["001", "001", "001"]),
            Self::West => (["001", "001", "001"], ["100", "100", "100"]),
        };
        Ok((
            StructuringElement::from_rows(&hit)?,
            StructuringElement::from_rows(&miss)?,
        ))
    }
}

/// Apply all four directions in order, `iterations` times. Zero iterations
/// returns an identical copy.
pub fn thicken(image: &BinaryImage, iterations: u32) -> Result<BinaryImage> {
    let pairs = Direction::ALL
        .iter()
        .map(|d| d.elements())
        .collect::<Result<Vec<_>>>()?;

    let mut current = image.clone();
    for _ in 0..iterations {
        for (hit, miss) in &pairs {
            let grown = hit_or_miss(&current, hit, miss)?;
            current = current.union(&grown);
        }
    }
    debug!(
        iterations,
        added = current.count() - image.count(),
        "Thickening finished"
    );
    Ok(current)
}
