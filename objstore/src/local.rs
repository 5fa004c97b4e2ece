//! Local file access for part transfers.
//!
//! Every worker touches a disjoint byte range of the same file, so one
//! shared handle with positioned reads and writes is enough; no worker ever
//! moves a shared cursor. Blocking file calls run on tokio's blocking pool.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{TransportError, TransportResult};

/// A local file shared by all workers of one transfer.
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    file: Arc<File>,
    len: u64,
}

impl LocalFile {
    /// Opens (or creates) a download destination sized to `total_size`.
    ///
    /// Existing content is never truncated below `total_size`, so data left
    /// behind by an aborted transfer remains available for resumption. The
    /// length is set with `set_len`, which produces a sparse file on
    /// filesystems that support it.
    pub fn prepare_download(path: &Path, total_size: u64) -> TransportResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| TransportError::io(parent, e))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| TransportError::io(path, e))?;

        let current = file
            .metadata()
            .map_err(|e| TransportError::io(path, e))?
            .len();
        if current != total_size {
            file.set_len(total_size)
                .map_err(|e| TransportError::io(path, e))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
            len: total_size,
        })
    }

    /// Opens an upload source, which must be exactly `expected_size` bytes.
    pub fn open_upload(path: &Path, expected_size: u64) -> TransportResult<Self> {
        let file = File::open(path).map_err(|e| TransportError::io(path, e))?;
        let actual = file
            .metadata()
            .map_err(|e| TransportError::io(path, e))?
            .len();

        if actual != expected_size {
            return Err(TransportError::SizeMismatch {
                expected: expected_size,
                actual,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
            len: actual,
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the file when it was opened.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True for a zero-length file.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes all of `data` starting at `offset`.
    pub async fn write_at(&self, offset: u64, data: Bytes) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || write_all_at(&file, &data, offset))
            .await
            .map_err(io::Error::other)?
    }

    /// Reads exactly `len` bytes starting at `offset`.
    pub async fn read_at(&self, offset: u64, len: u64) -> io::Result<Bytes> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "read too large"))?;
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            read_exact_at(&file, &mut buf, offset)?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Flushes written data to disk.
    pub async fn sync_all(&self) -> io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(io::Error::other)?
    }
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        written += n;
    }
    Ok(())
}

#[cfg(windows)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut read = 0;
    while read < buf.len() {
        let n = file.seek_read(&mut buf[read..], offset + read as u64)?;
        if n == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        read += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_download_sizes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/object.bam");

        let file = LocalFile::prepare_download(&path, 4096).unwrap();
        assert_eq!(file.len(), 4096);
        assert_eq!(fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn test_prepare_download_keeps_existing_data() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("object.bam");
        fs::write(&path, b"already here").unwrap();

        LocalFile::prepare_download(&path, 64).unwrap();
        let content = fs::read(&path).unwrap();
        assert_eq!(content.len(), 64);
        assert_eq!(&content[..12], b"already here");
    }

    #[test]
    fn test_open_upload_size_mismatch() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("source.bam");
        fs::write(&path, b"0123456789").unwrap();

        let result = LocalFile::open_upload(&path, 11);
        assert!(matches!(
            result,
            Err(TransportError::SizeMismatch {
                expected: 11,
                actual: 10
            })
        ));
        assert!(LocalFile::open_upload(&path, 10).is_ok());
    }

    #[test]
    fn test_open_upload_missing_file() {
        let temp = TempDir::new().unwrap();
        let result = LocalFile::open_upload(&temp.path().join("missing"), 1);
        assert!(matches!(result, Err(TransportError::Io { .. })));
    }

    #[tokio::test]
    async fn test_out_of_order_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("object.bin");
        let file = LocalFile::prepare_download(&path, 11).unwrap();

        file.write_at(6, Bytes::from_static(b"World")).await.unwrap();
        file.write_at(0, Bytes::from_static(b"Hello ")).await.unwrap();
        file.sync_all().await.unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"Hello World");
        assert_eq!(&file.read_at(6, 5).await.unwrap()[..], b"World");
    }

    #[tokio::test]
    async fn test_read_past_end_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("source.bin");
        fs::write(&path, b"abc").unwrap();
        let file = LocalFile::open_upload(&path, 3).unwrap();

        assert!(file.read_at(1, 5).await.is_err());
    }
}
