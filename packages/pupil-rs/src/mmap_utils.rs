use crate::error::Result;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Map a gaze export read-only. The file must not be truncated while mapped.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}
