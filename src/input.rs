// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input file handling: compression codecs and row estimation.
//!
//! Byte-range chunking needs a seekable plain-text stream, so compressed
//! inputs are decompressed into the temp directory once up front. Every
//! offset elsewhere in the pipeline refers to the decompressed stream.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::read::GzDecoder;
use tracing::{debug, info};

use crate::error::Result;
use crate::schema::RECORD_TERMINATOR;

/// Buffer size for the decompression pre-pass.
const IO_BUF_SIZE: usize = 8 * 1024 * 1024;

/// Window read from the head of the stream to estimate bytes per record.
const ESTIMATE_WINDOW: usize = 1 << 20;

/// Input compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl Codec {
    /// Codec implied by the file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("gz") | Some("gzip") => Codec::Gzip,
            Some("zst") | Some("zstd") => Codec::Zstd,
            _ => Codec::None,
        }
    }

    /// Name the engine's bulk copy understands when it decompresses
    /// natively (direct mode hands the compressed file straight over).
    pub fn engine_name(self) -> Option<&'static str> {
        match self {
            Codec::None => None,
            Codec::Gzip => Some("gzip"),
            Codec::Zstd => Some("zstd"),
        }
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(Codec::None),
            "gzip" | "gz" => Ok(Codec::Gzip),
            "zstd" | "zst" => Ok(Codec::Zstd),
            other => Err(format!(
                "unknown compression '{other}' (expected none, uncompressed, gzip or zstd)"
            )),
        }
    }
}

/// A seekable plain-text view of the input, with its sampled row estimate.
#[derive(Debug)]
pub struct InputFile {
    path: PathBuf,
    pub size_bytes: u64,
    /// Rows estimated from the head window. Drives progress totals and
    /// row-based chunk sizing, never correctness.
    pub estimated_rows: u64,
    /// Set when the stream is a decompressed copy this value owns.
    scratch: Option<PathBuf>,
}

impl InputFile {
    /// Open `path`, decompressing into `temp_dir` first when `codec` says
    /// the file is compressed.
    pub fn open(path: &Path, codec: Codec, temp_dir: &Path) -> Result<Self> {
        let (stream_path, scratch) = match codec {
            Codec::None => (path.to_path_buf(), None),
            _ => {
                let plain = temp_dir.join("input_plain.csv");
                let written = decompress_to(path, codec, &plain)?;
                info!(
                    "decompressed {} to {} ({} bytes)",
                    path.display(),
                    plain.display(),
                    written
                );
                (plain.clone(), Some(plain))
            }
        };

        let size_bytes = std::fs::metadata(&stream_path)?.len();
        let estimated_rows = estimate_rows(&stream_path, size_bytes)?;
        debug!(
            "input {}: {} bytes, ~{} rows",
            stream_path.display(),
            size_bytes,
            estimated_rows
        );

        Ok(Self {
            path: stream_path,
            size_bytes,
            estimated_rows,
            scratch,
        })
    }

    /// Path of the seekable plain-text stream.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InputFile {
    fn drop(&mut self) {
        if let Some(scratch) = &self.scratch {
            let _ = std::fs::remove_file(scratch);
        }
    }
}

fn decompress_to(src: &Path, codec: Codec, dst: &Path) -> Result<u64> {
    let mut input = BufReader::with_capacity(IO_BUF_SIZE, File::open(src)?);
    let mut output = BufWriter::with_capacity(IO_BUF_SIZE, File::create(dst)?);

    let written = match codec {
        Codec::Gzip => {
            let mut decoder = GzDecoder::new(input);
            io::copy(&mut decoder, &mut output)?
        }
        Codec::Zstd => {
            let mut decoder = zstd::Decoder::new(input)?;
            io::copy(&mut decoder, &mut output)?
        }
        Codec::None => io::copy(&mut input, &mut output)?,
    };
    output.flush()?;
    Ok(written)
}

/// Estimate total rows from the average record length in the head window.
/// Files smaller than the window are counted exactly.
fn estimate_rows(path: &Path, size_bytes: u64) -> Result<u64> {
    if size_bytes == 0 {
        return Ok(0);
    }

    let window = ESTIMATE_WINDOW.min(size_bytes as usize);
    let mut head = vec![0u8; window];
    let mut file = File::open(path)?;
    file.read_exact(&mut head)?;

    let terminators = memchr::memchr_iter(RECORD_TERMINATOR, &head).count() as u64;

    if size_bytes <= ESTIMATE_WINDOW as u64 {
        let trailing = head.last() == Some(&RECORD_TERMINATOR);
        return Ok(terminators + u64::from(!trailing));
    }
    if terminators == 0 {
        // Records longer than the window; planning degrades to one chunk.
        return Ok(1);
    }

    let avg = window as f64 / terminators as f64;
    Ok((size_bytes as f64 / avg).round().max(1.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_parsing_accepts_aliases() {
        assert_eq!("none".parse::<Codec>().unwrap(), Codec::None);
        assert_eq!("uncompressed".parse::<Codec>().unwrap(), Codec::None);
        assert_eq!("GZIP".parse::<Codec>().unwrap(), Codec::Gzip);
        assert_eq!("zst".parse::<Codec>().unwrap(), Codec::Zstd);
        assert!("lz4".parse::<Codec>().is_err());
    }

    #[test]
    fn codec_from_extension() {
        assert_eq!(Codec::from_path(Path::new("a.csv.gz")), Codec::Gzip);
        assert_eq!(Codec::from_path(Path::new("a.csv.zst")), Codec::Zstd);
        assert_eq!(Codec::from_path(Path::new("a.csv")), Codec::None);
    }

    #[test]
    fn small_files_count_rows_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");

        std::fs::write(&path, "a;b\nc;d\ne;f\n").unwrap();
        let input = InputFile::open(&path, Codec::None, dir.path()).unwrap();
        assert_eq!(input.estimated_rows, 3);

        std::fs::write(&path, "a;b\nc;d\ne;f").unwrap();
        let input = InputFile::open(&path, Codec::None, dir.path()).unwrap();
        assert_eq!(input.estimated_rows, 3, "unterminated tail is a record");
    }

    #[test]
    fn empty_file_estimates_zero_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();
        let input = InputFile::open(&path, Codec::None, dir.path()).unwrap();
        assert_eq!(input.estimated_rows, 0);
        assert_eq!(input.size_bytes, 0);
    }

    #[test]
    fn large_files_estimate_from_head_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.csv");

        // Uniform 64-byte records over ~2 MiB make the estimate exact.
        let record = format!("{};x\n", "d".repeat(60));
        let rows = (2 * ESTIMATE_WINDOW) / record.len();
        std::fs::write(&path, record.repeat(rows)).unwrap();

        let input = InputFile::open(&path, Codec::None, dir.path()).unwrap();
        assert_eq!(input.estimated_rows, rows as u64);
    }

    #[test]
    fn gzip_pre_pass_materializes_plain_stream() {
        use flate2::write::GzEncoder;
        use flate2::Compression;

        let dir = tempfile::tempdir().unwrap();
        let compressed = dir.path().join("rows.csv.gz");
        let raw = "a;b\nc;d\n";

        let file = File::create(&compressed).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(raw.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let scratch_path;
        {
            let input = InputFile::open(&compressed, Codec::Gzip, dir.path()).unwrap();
            assert_eq!(input.size_bytes, raw.len() as u64);
            assert_eq!(input.estimated_rows, 2);
            scratch_path = input.path().to_path_buf();
            assert!(scratch_path.exists());
        }
        assert!(!scratch_path.exists(), "scratch removed on drop");
    }
}
