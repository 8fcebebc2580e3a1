/// Embedded JPEG extraction from camera RAW files
///
/// Most RAW containers carry one or more JPEG renditions of the shot. The
/// largest one is a good stand-in for the real image at every size this
/// crate needs, and decoding it is far cheaper than developing the sensor
/// data.

use std::path::Path;

use crate::error::DecodeError;

const JPEG_SOI: &[u8] = b"\xff\xd8\xff";
const JPEG_EOI: &[u8] = b"\xff\xd9";

/// Read `raw_path` and return its largest embedded JPEG
pub fn extract_largest_jpeg(raw_path: &Path) -> Result<Vec<u8>, DecodeError> {
    let buffer = std::fs::read(raw_path).map_err(|source| DecodeError::Io {
        path: raw_path.to_path_buf(),
        source,
    })?;

    match scan_for_largest_jpeg(&buffer) {
        Some(jpeg) => {
            log::debug!(
                "Found {}KB JPEG in {}",
                jpeg.len() / 1024,
                raw_path.display()
            );
            Ok(jpeg.to_vec())
        }
        None => Err(DecodeError::NoEmbeddedPreview(raw_path.to_path_buf())),
    }
}

/// Scan for SOI/EOI marker pairs and return the largest span
pub fn scan_for_largest_jpeg(buffer: &[u8]) -> Option<&[u8]> {
    let mut largest: Option<&[u8]> = None;
    let mut pos = 0;

    while pos + JPEG_SOI.len() <= buffer.len() {
        if !buffer[pos..].starts_with(JPEG_SOI) {
            pos += 1;
            continue;
        }

        let Some(end) = buffer[pos..]
            .windows(JPEG_EOI.len())
            .position(|w| w == JPEG_EOI)
            .map(|offset| pos + offset + JPEG_EOI.len())
        else {
            // No end marker anywhere after this point
            break;
        };

        let candidate = &buffer[pos..end];
        if largest.map_or(true, |best| candidate.len() > best.len()) {
            largest = Some(candidate);
        }
        pos = end;
    }

    largest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_largest_span() {
        let mut data = vec![0u8; 16];
        data.extend_from_slice(b"\xff\xd8\xff\x01\x02\xff\xd9");
        data.extend_from_slice(&[0u8; 8]);
        data.extend_from_slice(b"\xff\xd8\xff\x01\x02\x03\x04\x05\xff\xd9");
        data.extend_from_slice(&[0u8; 4]);

        let jpeg = scan_for_largest_jpeg(&data).unwrap();
        assert_eq!(jpeg, b"\xff\xd8\xff\x01\x02\x03\x04\x05\xff\xd9");
    }

    #[test]
    fn test_no_markers() {
        assert!(scan_for_largest_jpeg(&[]).is_none());
        assert!(scan_for_largest_jpeg(&[0xff, 0xd8]).is_none());
        assert!(scan_for_largest_jpeg(b"\x00\xff\xd8\xff\x10\x20").is_none());
    }

    #[test]
    fn test_missing_file() {
        let result = extract_largest_jpeg(Path::new("/no/such/file.nef"));
        assert!(matches!(result, Err(DecodeError::Io { .. })));
    }

    #[test]
    fn test_file_without_preview() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.nef");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();
        assert!(matches!(
            extract_largest_jpeg(&path),
            Err(DecodeError::NoEmbeddedPreview(_))
        ));
    }
}
