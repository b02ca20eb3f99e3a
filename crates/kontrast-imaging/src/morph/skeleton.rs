// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Morphological skeleton by successive erosion and opening.

use tracing::debug;

use super::binary::{BinaryImage, Border, StructuringElement, erode, open};

/// Result of a skeletonisation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonOutcome {
    pub image: BinaryImage,
    pub iterations: u32,
}

/// Erode with a 3x3 cross, accumulate `eroded - open(eroded)`, and continue
/// from the eroded image until it is empty or `max_iterations` is reached.
pub fn skeletonize(image: &BinaryImage, max_iterations: u32) -> SkeletonOutcome {
    let cross = StructuringElement::cross();
    let mut skeleton = BinaryImage::new(image.width(), image.height());
    let mut current = image.clone();
    let mut iterations = 0;

    while iterations < max_iterations && !current.is_empty() {
        let eroded = erode(&current, &cross, Border::Background);
        let opened = open(&eroded, &cross);
        skeleton = skeleton.union(&eroded.difference(&opened));
        current = eroded;
        iterations += 1;
    }

    debug!(
        iterations,
        pixels = skeleton.count(),
        "Skeletonisation finished"
    );
    SkeletonOutcome {
        image: skeleton,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(w: usize, h: usize) -> BinaryImage {
        let rows: Vec<String> = (0..h).map(|_| "#".repeat(w)).collect();
        let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
        BinaryImage::from_rows(&refs).expect("image")
    }

    #[test]
    fn skeleton_is_subset_of_foreground() {
        let shape = BinaryImage::from_rows(&[
            "...........",
            ".#########.",
            ".#########.",
            ".#########.",
            ".#########.",
            ".#########.",
            "...........",
        ])
        .expect("image");
        let outcome = skeletonize(&shape, 100);
        assert!(outcome.image.is_subset_of(&shape));
        assert!(!outcome.image.is_empty());
        assert!(outcome.iterations <= 100);
    }

    #[test]
    fn iteration_cap_bounds_the_loop() {
        let outcome = skeletonize(&filled(30, 30), 3);
        assert_eq!(outcome.iterations, 3);
    }

    #[test]
    fn empty_input_needs_no_iterations() {
        let outcome = skeletonize(&BinaryImage::new(8, 8), 100);
        assert_eq!(outcome.iterations, 0);
        assert!(outcome.image.is_empty());
    }

    #[test]
    fn deterministic() {
        let shape = filled(12, 7);
        assert_eq!(skeletonize(&shape, 100), skeletonize(&shape, 100));
    }
}
