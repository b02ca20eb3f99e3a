// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Codec boundary: decode files/bytes into `PixelBuffer`s and encode results
// back out. Everything format-specific is delegated to the `image` crate.

use std::fmt::Display;
use std::io::Cursor;
use std::path::Path;

use image::{ImageError, ImageFormat};
use kontrast_core::error::{KontrastError, Result};
use tracing::{debug, instrument};

use crate::buffer::PixelBuffer;

fn codec_error(context: impl Display, err: ImageError) -> KontrastError {
    KontrastError::Codec(format!("{context}: {err}"))
}

/// Decode encoded bytes. The format is sniffed from the content.
#[instrument(skip(data), fields(len = data.len()))]
pub fn decode(data: &[u8]) -> Result<PixelBuffer> {
    let format = image::guess_format(data).map_err(|e| codec_error("unrecognised image data", e))?;
    let decoded = image::load_from_memory_with_format(data, format)
        .map_err(|e| codec_error(format!("{format:?} decode"), e))?;
    let buffer = PixelBuffer::from_dynamic(&decoded)?;
    debug!(
        ?format,
        width = buffer.width(),
        height = buffer.height(),
        channels = buffer.channels().count(),
        "decoded"
    );
    Ok(buffer)
}

/// Read and decode a file. A missing or unreadable file is an I/O error;
/// bytes that are not an image are a codec error naming the path.
pub fn open(path: impl AsRef<Path>) -> Result<PixelBuffer> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    decode(&bytes).map_err(|e| match e {
        KontrastError::Codec(msg) => KontrastError::Codec(format!("{}: {msg}", path.display())),
        other => other,
    })
}

/// Encode a buffer as PNG bytes.
pub fn to_png_bytes(buffer: &PixelBuffer) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    buffer
        .to_dynamic()?
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|e| codec_error("PNG encode", e))?;
    Ok(out.into_inner())
}

/// Write a buffer to disk in the format named by the file extension.
pub fn save(buffer: &PixelBuffer, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path).map_err(|e| codec_error(path.display(), e))?;
    buffer
        .to_dynamic()?
        .save_with_format(path, format)
        .map_err(|e| codec_error(path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Channels;

    #[test]
    fn png_bytes_decode_back_to_same_pixels() {
        let data: Vec<u8> = (0..48).map(|v| (v * 5) as u8).collect();
        let buffer = PixelBuffer::new(4, 4, Channels::Rgb, data).expect("buffer");
        let png = to_png_bytes(&buffer).expect("encode");
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(decode(&png).expect("decode"), buffer);
    }

    #[test]
    fn gray_png_stays_single_channel() {
        let buffer = PixelBuffer::filled(5, 3, Channels::Gray, 200).expect("buffer");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gray.png");
        save(&buffer, &path).expect("save");
        let loaded = open(&path).expect("open");
        assert_eq!(loaded.channels(), Channels::Gray);
        assert_eq!(loaded.dimensions(), (5, 3));
    }

    #[test]
    fn missing_file_is_io_and_bad_extension_is_codec() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = open(dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, KontrastError::Io(_)));

        let buffer = PixelBuffer::filled(2, 2, Channels::Gray, 1).expect("buffer");
        let err = save(&buffer, dir.path().join("out.unknownext")).unwrap_err();
        assert!(matches!(err, KontrastError::Codec(_)));
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, KontrastError::Codec(_)));
    }
}
