// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the kontrast-imaging crate: local statistics,
// local entropy, Zhang-Suen thinning, and the full enhancement pipeline on
// synthetic images.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use kontrast_core::ParameterBag;
use kontrast_imaging::morph::{BinaryImage, zhang_suen};
use kontrast_imaging::{
    Channels, EnhancementPipeline, FloatBuffer, NoProgress, PixelBuffer, Plane, local_entropy,
    local_statistics,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Gray gradient with a checkerboard overlay, so every window has texture.
fn textured(width: u32, height: u32) -> PixelBuffer {
    let data = (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            let check = if (x / 16 + y / 16) % 2 == 0 { 50 } else { 0 };
            ((x + y) % 180 + check) as u8
        })
        .collect();
    PixelBuffer::new(width, height, Channels::Gray, data).expect("fixture buffer")
}

/// Thick ring, the kind of blob thinning is meant for.
fn ring(size: u32) -> BinaryImage {
    let c = size as f32 / 2.0;
    let rows: Vec<String> = (0..size)
        .map(|y| {
            (0..size)
                .map(|x| {
                    let d = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
                    if d > c * 0.4 && d < c * 0.8 { '#' } else { '.' }
                })
                .collect()
        })
        .collect();
    let refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    BinaryImage::from_rows(&refs).expect("fixture ring")
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_local_statistics(c: &mut Criterion) {
    let buffer = FloatBuffer::from_pixels(&textured(256, 256));
    c.bench_function("local_statistics (256x256, w=15)", |b| {
        b.iter(|| black_box(local_statistics(black_box(&buffer), 15).expect("stats")));
    });
}

fn bench_local_entropy(c: &mut Criterion) {
    let gray = textured(256, 256).luma();
    let plane = Plane::from_gray(&gray);
    c.bench_function("local_entropy (256x256, w=15)", |b| {
        b.iter(|| black_box(local_entropy(black_box(&plane), 15).expect("entropy")));
    });
}

fn bench_thinning(c: &mut Criterion) {
    let image = ring(128);
    c.bench_function("zhang_suen (128x128 ring)", |b| {
        b.iter(|| black_box(zhang_suen(black_box(&image), 100)));
    });
}

fn bench_pipeline(c: &mut Criterion) {
    let input = textured(320, 240);
    let standard = EnhancementPipeline::default();
    let simplified =
        EnhancementPipeline::from_bag(&ParameterBag::new().with("simplified_processing", true));

    c.bench_function("enhance standard (320x240)", |b| {
        b.iter(|| black_box(standard.run(input.clone(), &NoProgress).expect("enhance")));
    });
    c.bench_function("enhance simplified (320x240)", |b| {
        b.iter(|| black_box(simplified.run(input.clone(), &NoProgress).expect("enhance")));
    });
}

criterion_group!(
    benches,
    bench_local_statistics,
    bench_local_entropy,
    bench_thinning,
    bench_pipeline
);
criterion_main!(benches);
