//! Where the transferred bytes come from and go to.
//!
//! The protocol moves one opaque blob; these traits are the narrow seam to
//! the surrounding filesystem. An optional external-archiver step shrinks
//! the blob before transfer and restores it afterwards, shelling out to `7z`
//! the way the field setup does and trusting its own success marker on
//! stdout rather than parsing archive state. [`CompressedFileSource`] and
//! [`CompressedFileSink`] wrap that step around the plain file source and
//! sink, so a session compresses simply by being handed the wrapped pair.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, warn};

/// The archiver prints this when an operation fully succeeded.
const ARCHIVER_OK: &[u8] = b"Everything is Ok";

/// Supplies the blob a sending session transmits.
pub trait BlobSource {
    fn read_all(&mut self) -> io::Result<Vec<u8>>;
}

/// Stores the blob a receiving session produced.
pub trait BlobSink {
    fn write_all(&mut self, blob: &[u8]) -> io::Result<()>;
}

/// A file-backed [`BlobSource`].
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BlobSource for FileSource {
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        debug!("loading file in {}", self.path.display());
        fs::read(&self.path)
    }
}

/// A file-backed [`BlobSink`].
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BlobSink for FileSink {
    fn write_all(&mut self, blob: &[u8]) -> io::Result<()> {
        debug!("storing {} bytes in {}", blob.len(), self.path.display());
        fs::write(&self.path, blob)
    }
}

/// A [`BlobSource`] that packs a raw file through the external archiver and
/// hands the archive bytes to the transfer.
///
/// The compression level is the one knob the protocol configuration carries
/// for this step ([`LinkConfig::compression_level`](crate::config::LinkConfig)).
pub struct CompressedFileSource {
    raw: PathBuf,
    archive: PathBuf,
    level: u32,
}

impl CompressedFileSource {
    pub fn new(raw: impl Into<PathBuf>, archive: impl Into<PathBuf>, level: u32) -> Self {
        Self {
            raw: raw.into(),
            archive: archive.into(),
            level,
        }
    }
}

impl BlobSource for CompressedFileSource {
    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        // A leftover archive would make the archiver append to it instead of
        // packing fresh.
        if self.archive.exists() {
            fs::remove_file(&self.archive)?;
        }
        if !compress_external(&self.raw, &self.archive, self.level)? {
            return Err(io::Error::other("archiver did not confirm packing"));
        }
        debug!(
            "packed {} into {}",
            self.raw.display(),
            self.archive.display()
        );
        fs::read(&self.archive)
    }
}

/// A [`BlobSink`] that stores the received bytes as an archive and unpacks
/// it through the external archiver.
pub struct CompressedFileSink {
    archive: PathBuf,
    out_dir: PathBuf,
}

impl CompressedFileSink {
    pub fn new(archive: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            out_dir: out_dir.into(),
        }
    }
}

impl BlobSink for CompressedFileSink {
    fn write_all(&mut self, blob: &[u8]) -> io::Result<()> {
        fs::write(&self.archive, blob)?;
        if !decompress_external(&self.archive, &self.out_dir)? {
            return Err(io::Error::other("archiver did not confirm unpacking"));
        }
        debug!(
            "unpacked {} into {}",
            self.archive.display(),
            self.out_dir.display()
        );
        Ok(())
    }
}

/// Packs `input` into a `7z` archive at `archive` with the given compression
/// level, returning whether the archiver reported success.
pub fn compress_external(input: &Path, archive: &Path, level: u32) -> io::Result<bool> {
    let output = Command::new("7z")
        .arg("a")
        .arg(format!("-mx={level}"))
        .arg(archive)
        .arg(input)
        .output()?;
    let ok = archiver_succeeded(&output.stdout);
    if !ok {
        warn!("archiver did not confirm compressing {}", input.display());
    }
    Ok(ok)
}

/// Unpacks `archive` into `out_dir`, returning whether the archiver reported
/// success.
pub fn decompress_external(archive: &Path, out_dir: &Path) -> io::Result<bool> {
    let output = Command::new("7z")
        .arg("x")
        .arg("-y")
        .arg(format!("-o{}", out_dir.display()))
        .arg(archive)
        .output()?;
    let ok = archiver_succeeded(&output.stdout);
    if !ok {
        warn!("archiver did not confirm unpacking {}", archive.display());
    }
    Ok(ok)
}

fn archiver_succeeded(stdout: &[u8]) -> bool {
    stdout
        .windows(ARCHIVER_OK.len())
        .any(|window| window == ARCHIVER_OK)
}
