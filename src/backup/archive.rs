// dbdump/src/backup/archive.rs
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::backup::naming::GZIP_SUFFIX;
use crate::errors::CompressError;

/// Gzips `source` into a sibling `<source>.gz` at maximum compression, then removes `source`.
///
/// The destination is flushed and synced before the source is removed, so a failure at
/// any point leaves at least the original intact. A partially written destination is left
/// in place; the next run with the same key overwrites it.
///
/// # Returns
/// Path to the compressed file.
pub fn gzip_file(source: &Path) -> Result<PathBuf, CompressError> {
    let open_err = |error: io::Error| CompressError::Open {
        path: source.to_path_buf(),
        error,
    };

    let input = File::open(source).map_err(open_err)?;
    if input.metadata().map_err(open_err)?.is_dir() {
        return Err(open_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "is a directory",
        )));
    }

    let dest = gzip_path(source);
    let write_err = |error: io::Error| CompressError::Write {
        path: dest.clone(),
        error,
    };

    let output = File::create(&dest).map_err(|error| CompressError::Create {
        path: dest.clone(),
        error,
    })?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::best());
    let mut reader = BufReader::new(input);
    let bytes_in = io::copy(&mut reader, &mut encoder).map_err(write_err)?;

    let output = encoder
        .finish()
        .map_err(write_err)?
        .into_inner()
        .map_err(|e| write_err(e.into_error()))?;
    output.sync_all().map_err(write_err)?;
    let bytes_out = output.metadata().map(|m| m.len()).unwrap_or_default();
    drop(output);
    drop(reader);

    fs::remove_file(source).map_err(|error| CompressError::RemoveSource {
        path: source.to_path_buf(),
        error,
    })?;

    info!(
        "✓ Compressed {} ({} bytes) to {} ({} bytes)",
        source.display(),
        bytes_in,
        dest.display(),
        bytes_out
    );
    Ok(dest)
}

fn gzip_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(GZIP_SUFFIX);
    PathBuf::from(name)
}
