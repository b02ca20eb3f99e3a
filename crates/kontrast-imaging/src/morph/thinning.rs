// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Zhang-Suen thinning.
//
// Both sub-passes of an iteration are evaluated against the same snapshot of
// the image and their deletions applied together afterwards. Pixels outside
// the image are background, so foreground on the border is thinned too.

use tracing::debug;

use super::binary::{BinaryImage, Border};

/// Result of a thinning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThinningOutcome {
    pub image: BinaryImage,
    /// Iterations performed, including the final one that deleted nothing.
    pub iterations: u32,
    /// True when the last iteration made no deletions.
    pub converged: bool,
}

/// Neighbours p2..p9, clockwise from north.
fn neighbours(image: &BinaryImage, x: u32, y: u32) -> [u8; 8] {
    let (x, y) = (x as i64, y as i64);
    [
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
        (-1, -1),
    ]
    .map(|(dx, dy)| image.get_or(x + dx, y + dy, Border::Background) as u8)
}

/// Whether the foreground pixel at (x, y) is deletable in either sub-pass.
///
/// Both sub-pass conditions are tested against the same snapshot, so a pixel
/// goes if either would remove it. Strokes two pixels wide have every pixel
/// deletable from one side or the other and disappear in a single iteration,
/// where a sequential two-pass thinning would keep a one-pixel line.
fn deletable(image: &BinaryImage, x: u32, y: u32) -> bool {
    let p = neighbours(image, x, y);
    let [p2, _, p4, _, p6, _, p8, _] = p;

    let b: u8 = p.iter().sum();
    if !(2..=6).contains(&b) {
        return false;
    }
    let a = (0..8).filter(|&k| p[k] == 0 && p[(k + 1) % 8] == 1).count();
    if a != 1 {
        return false;
    }

    let first = p2 * p4 * p6 == 0 && p4 * p6 * p8 == 0;
    let second = p2 * p4 * p8 == 0 && p2 * p6 * p8 == 0;
    first || second
}

/// One full iteration. Returns the thinned image and the number of pixels
/// deleted.
pub fn thinning_pass(image: &BinaryImage) -> (BinaryImage, usize) {
    let mut marked = Vec::new();
    for y in 0..image.height() {
        for x in 0..image.width() {
            if image.get(x, y) && deletable(image, x, y) {
                marked.push((x, y));
            }
        }
    }
    let mut out = image.clone();
    for &(x, y) in &marked {
        out.set(x, y, false);
    }
    (out, marked.len())
}

/// Thin until an iteration deletes nothing or `max_iterations` is reached.
pub fn zhang_suen(image: &BinaryImage, max_iterations: u32) -> ThinningOutcome {
    let mut current = image.clone();
    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        iterations += 1;
        let (next, deleted) = thinning_pass(&current);
        current = next;
        if deleted == 0 {
            converged = true;
            break;
        }
    }
    debug!(
        iterations,
        converged,
        remaining = current.count(),
        "Zhang-Suen thinning finished"
    );
    ThinningOutcome {
        image: current,
        iterations,
        converged,
    }
}
