// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decoded-image cache keyed by content hash.
//
// Purely an optimisation: callers always receive their own copy of the
// buffer, and clearing the cache never changes results.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use kontrast_core::error::Result;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::buffer::PixelBuffer;
use crate::codec;

/// Bounded cache of decoded images; the oldest entry is evicted first.
#[derive(Debug)]
pub struct ImageCache {
    capacity: usize,
    entries: HashMap<String, PixelBuffer>,
    order: VecDeque<String>,
}

impl ImageCache {
    /// A cache holding at most `capacity` images. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Hex SHA-256 of `bytes`, used as the cache key.
    pub fn content_key(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    /// Read `path` and return its decoded pixels, decoding only on a miss.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn get_or_load(&mut self, path: impl AsRef<Path>) -> Result<PixelBuffer> {
        let bytes = std::fs::read(path.as_ref())?;
        self.get_or_decode(&bytes)
    }

    /// Decode `bytes`, reusing a cached buffer with the same content.
    pub fn get_or_decode(&mut self, bytes: &[u8]) -> Result<PixelBuffer> {
        let key = Self::content_key(bytes);
        if let Some(hit) = self.entries.get(&key) {
            debug!(key = %&key[..12], "Image cache hit");
            return Ok(hit.clone());
        }
        let decoded = codec::decode(bytes)?;
        self.insert(key, decoded.clone());
        Ok(decoded)
    }

    fn insert(&mut self, key: String, buffer: PixelBuffer) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                    debug!(key = %&oldest[..12], "Evicted oldest cached image");
                }
                None => break,
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, buffer);
    }

    pub fn contains(&self, bytes: &[u8]) -> bool {
        self.entries.contains_key(&Self::content_key(bytes))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every cached image.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Channels;

    fn png(value: u8) -> Vec<u8> {
        let buffer = PixelBuffer::filled(4, 4, Channels::Gray, value).expect("buffer");
        codec::to_png_bytes(&buffer).expect("encode")
    }

    #[test]
    fn loads_from_disk_and_hits_on_same_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.png");
        let b = dir.path().join("copy-of-a.png");
        std::fs::write(&a, png(10)).expect("write");
        std::fs::write(&b, png(10)).expect("write");

        let mut cache = ImageCache::new(4);
        let first = cache.get_or_load(&a).expect("load");
        let second = cache.get_or_load(&b).expect("load");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn evicts_oldest_first() {
        let mut cache = ImageCache::new(2);
        let (one, two, three) = (png(1), png(2), png(3));
        cache.get_or_decode(&one).expect("decode");
        cache.get_or_decode(&two).expect("decode");
        cache.get_or_decode(&three).expect("decode");
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&one));
        assert!(cache.contains(&two) && cache.contains(&three));
    }

    #[test]
    fn returned_buffers_are_independent_copies() {
        let mut cache = ImageCache::new(2);
        let bytes = png(50);
        let copy = cache.get_or_decode(&bytes).expect("decode");
        let _ = copy.into_data();
        let again = cache.get_or_decode(&bytes).expect("decode");
        assert!(again.data().iter().all(|&v| v == 50));
    }

    #[test]
    fn clear_empties_and_zero_capacity_never_stores() {
        let mut cache = ImageCache::new(3);
        cache.get_or_decode(&png(7)).expect("decode");
        cache.clear();
        assert!(cache.is_empty());

        let mut disabled = ImageCache::new(0);
        disabled.get_or_decode(&png(7)).expect("decode");
        assert!(disabled.is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let mut cache = ImageCache::new(1);
        let err = cache.get_or_load("/nonexistent/kontrast/input.png").unwrap_err();
        assert!(matches!(err, kontrast_core::KontrastError::Io(_)));
    }
}
