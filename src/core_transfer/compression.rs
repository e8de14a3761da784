// gzip handling for persistent-state images
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::core_transfer::error::TransferError;

/// Replaces a gzip file by its decompressed content.
///
/// The output is written to a temporary sibling and renamed over `path`
/// only once complete, so a corrupt input leaves the original untouched
/// and no partial output behind.
pub async fn decompress_in_place(path: &Path) -> Result<(), TransferError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || decompress_blocking(&path))
        .await
        .map_err(|e| TransferError::Io {
            path: PathBuf::new(),
            source: io::Error::other(e),
        })?
}

fn decompress_blocking(path: &Path) -> Result<(), TransferError> {
    let input = File::open(path).map_err(|e| TransferError::io(path, e))?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut output = NamedTempFile::new_in(parent).map_err(|e| TransferError::io(parent, e))?;

    let compression_error = |source| TransferError::Compression {
        path: path.to_path_buf(),
        source,
    };

    let mut decoder = GzDecoder::new(BufReader::new(input));
    let written = io::copy(&mut decoder, output.as_file_mut()).map_err(compression_error)?;
    output.as_file_mut().flush().map_err(compression_error)?;
    output
        .persist(path)
        .map_err(|e| TransferError::io(path, e.error))?;

    info!("Decompressed {} ({} bytes)", path.display(), written);
    Ok(())
}

/// Writes a gzip copy of `source` into `dest_dir` under the same file name.
pub async fn compress_into(source: &Path, dest_dir: &Path) -> Result<PathBuf, TransferError> {
    let name = source
        .file_name()
        .ok_or_else(|| TransferError::InvalidName(source.display().to_string()))?;
    let dest = dest_dir.join(name);
    let source = source.to_path_buf();

    let output = dest.clone();
    tokio::task::spawn_blocking(move || compress_blocking(&source, &output))
        .await
        .map_err(|e| TransferError::Io {
            path: PathBuf::new(),
            source: io::Error::other(e),
        })??;
    Ok(dest)
}

fn compress_blocking(source: &Path, dest: &Path) -> Result<(), TransferError> {
    let mut input = BufReader::new(File::open(source).map_err(|e| TransferError::io(source, e))?);
    let output = File::create(dest).map_err(|e| TransferError::io(dest, e))?;

    let compression_error = |source| TransferError::Compression {
        path: dest.to_path_buf(),
        source,
    };

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut input, &mut encoder).map_err(compression_error)?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .map_err(compression_error)?;
    Ok(())
}
