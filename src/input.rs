//! Opening the log for streaming. Archived logs (`*.zst`) are decompressed
//! on the fly.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Whether `path` names a zstd-compressed log.
pub fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

/// Open `path` as a buffered line source.
pub fn open(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if is_compressed(path) {
        let decoder = zstd::Decoder::new(file)?;
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
