//! Archive destinations
//!
//! A fetched image is handed to an [`ArchiveSink`]: [`FileSink`] writes the
//! archive to a path, [`DockerLoadSink`] writes it to a private temporary
//! directory and runs `<command> load -i <archive>`.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tempfile::{NamedTempFile, TempDir};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{PullError, Result};
use crate::image::archive::{ArchiveBuilder, FetchedImage};
use crate::logging::Logger;

pub const TEMP_DIR_PREFIX: &str = "docker-image-puller-";

/// What a sink did with the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Written { path: PathBuf, size: u64 },
    Loaded { command: String },
}

#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Short description for progress output
    fn describe(&self) -> String;

    async fn accept(&self, image: FetchedImage) -> Result<Delivery>;
}

/// Writes the archive to a fixed path
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ArchiveSink for FileSink {
    fn describe(&self) -> String {
        format!("writing {}", self.path.display())
    }

    async fn accept(&self, image: FetchedImage) -> Result<Delivery> {
        let size = write_archive(image, self.path.clone()).await?;
        Ok(Delivery::Written {
            path: self.path.clone(),
            size,
        })
    }
}

/// Writes the archive to a temporary directory and loads it with an
/// external command
pub struct DockerLoadSink {
    command: String,
    temp_root: Option<PathBuf>,
    output: Logger,
}

impl DockerLoadSink {
    pub fn new(command: impl Into<String>, output: Logger) -> Self {
        Self {
            command: command.into(),
            temp_root: None,
            output,
        }
    }

    /// Create the temporary directory under `root` instead of the system
    /// temp dir
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    fn create_temp_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_DIR_PREFIX);
        let dir = match &self.temp_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "created temporary directory");
        Ok(dir)
    }

    async fn write_and_load(&self, image: FetchedImage, dir: Arc<TempDir>) -> Result<()> {
        let archive_path = dir.path().join(image.reference.output_file_name());
        // The writer keeps the directory alive until it has stopped touching it
        let size = write_archive_holding(image, archive_path.clone(), dir).await?;
        self.output.info(&format!(
            "Archive ready ({}), running {} load",
            self.output.format_size(size),
            self.command
        ));

        let command_line = format!("{} load -i {}", self.command, archive_path.display());
        let status = Command::new(&self.command)
            .arg("load")
            .arg("-i")
            .arg(&archive_path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| PullError::ExternalLoad {
                command: command_line.clone(),
                status: format!("could not be started: {}", e),
            })?;

        if !status.success() {
            return Err(PullError::ExternalLoad {
                command: command_line,
                status: status.to_string(),
            });
        }
        Ok(())
    }

    fn cleanup(&self, dir: Arc<TempDir>) {
        let Ok(dir) = Arc::try_unwrap(dir) else {
            return;
        };
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!(path = %path.display(), error = %e, "failed to remove temporary directory");
            self.output.warning(&format!(
                "Failed to remove temporary directory {}: {}",
                path.display(),
                e
            ));
        }
    }
}

#[async_trait]
impl ArchiveSink for DockerLoadSink {
    fn describe(&self) -> String {
        format!("loading with {}", self.command)
    }

    async fn accept(&self, image: FetchedImage) -> Result<Delivery> {
        let dir = Arc::new(self.create_temp_dir()?);

        // Dropping this future mid-way cancels the writer, and the last
        // holder of `dir` removes it
        let result = self.write_and_load(image, Arc::clone(&dir)).await;
        self.cleanup(dir);

        result.map(|()| Delivery::Loaded {
            command: self.command.clone(),
        })
    }
}

/// Build the archive on the blocking pool and store it at `path`.
///
/// The archive is assembled in a temporary file next to `path` and renamed
/// into place only once complete, so `path` never holds a partial archive.
///
/// Dropping the returned future cancels the write: the blocking task stops at
/// its next write and removes its temporary file.
pub async fn write_archive(image: FetchedImage, path: PathBuf) -> Result<u64> {
    write_archive_holding(image, path, ()).await
}

/// Like [`write_archive`], but `hold` is only dropped once the blocking
/// writer has finished.
async fn write_archive_holding<H>(image: FetchedImage, path: PathBuf, hold: H) -> Result<u64>
where
    H: Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let _cancel_on_drop = CancelOnDrop(Arc::clone(&cancelled));

    tokio::task::spawn_blocking(move || {
        let result = write_archive_atomically(&image, &path, &cancelled);
        drop(hold);
        result
    })
    .await
    .map_err(|e| PullError::ArchiveBuild(format!("archive task failed: {}", e)))?
}

/// Raises the flag when the awaiting future goes away
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Fails every write once `cancelled` is set
struct CancellableWriter<'a, W> {
    inner: W,
    cancelled: &'a AtomicBool,
}

impl<W: Write> Write for CancellableWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(io::Error::other("archive write cancelled"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn write_archive_atomically(image: &FetchedImage, path: &Path, cancelled: &AtomicBool) -> Result<u64> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let temp = NamedTempFile::new_in(dir)?;
    let writer = CancellableWriter {
        inner: BufWriter::new(temp),
        cancelled,
    };
    let writer = match ArchiveBuilder::new(image).write_to(writer) {
        Ok(writer) => writer,
        Err(_) if cancelled.load(Ordering::Relaxed) => return Err(PullError::Cancelled),
        Err(e) => return Err(e),
    };
    let mut temp = writer
        .inner
        .into_inner()
        .map_err(|e| PullError::ArchiveBuild(format!("flushing archive: {}", e.error())))?;
    temp.flush()?;
    temp.as_file().sync_all()?;
    let size = temp.as_file().metadata()?.len();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))?;
    }

    if cancelled.load(Ordering::Relaxed) {
        return Err(PullError::Cancelled);
    }
    temp.persist(path).map_err(|e| PullError::Io(e.error))?;
    debug!(path = %path.display(), size, "archive written");
    Ok(size)
}
