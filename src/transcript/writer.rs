use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Append-only transcript log for one recording session.
///
/// One writer is shared by every worker in the session; lines are
/// serialized under a single lock and flushed immediately, so a crash
/// loses at most the line being written. The file stays valid structured
/// text even when the footer never lands.
pub struct TranscriptWriter {
    path: PathBuf,
    started_at: DateTime<Utc>,
    inner: Mutex<WriterInner>,
}

struct WriterInner {
    file: BufWriter<File>,
    lines: u64,
    finalized: bool,
}

impl TranscriptWriter {
    /// Create the session file inside `dir` and write the header.
    ///
    /// `devices` are display entries for the header, in selection order
    /// (e.g. "Mic1 (Blue Yeti)").
    pub fn create(dir: &Path, devices: &[String]) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| {
            format!("Failed to create transcript directory: {}", dir.display())
        })?;

        let started_at = Utc::now();
        let file_name = format!("{}_transcript.md", Local::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(file_name);

        let file = File::create(&path)
            .with_context(|| format!("Failed to create transcript file: {}", path.display()))?;
        let mut file = BufWriter::new(file);

        writeln!(file, "# Meeting Transcript")?;
        writeln!(
            file,
            "- Started: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(file, "- Devices: {}", devices.join(", "))?;
        writeln!(file)?;
        file.flush().context("Failed to flush transcript header")?;

        info!("Transcript session started: {}", path.display());

        Ok(Self {
            path,
            started_at,
            inner: Mutex::new(WriterInner {
                file,
                lines: 0,
                finalized: false,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lines_written(&self) -> u64 {
        self.locked().lines
    }

    /// Append one accepted transcription line and flush it to disk.
    ///
    /// Embedded newlines are flattened so a result can never span rows.
    pub fn append(&self, label: &str, text: &str) -> Result<()> {
        let safe_text = text.trim().replace(['\r', '\n'], " ");
        let timestamp = Local::now().format("%H:%M:%S");

        let mut inner = self.locked();
        if inner.finalized {
            bail!("Transcript file is already finalized");
        }

        writeln!(inner.file, "- [{}] [{}] {}", timestamp, label, safe_text)
            .context("Failed to append transcript line")?;
        inner.file.flush().context("Failed to flush transcript line")?;
        inner.lines += 1;

        Ok(())
    }

    /// Write the footer (end time, duration) and stop accepting lines.
    /// Safe to call more than once.
    pub fn finalize(&self) -> Result<()> {
        let mut inner = self.locked();
        if inner.finalized {
            return Ok(());
        }

        let elapsed = Utc::now().signed_duration_since(self.started_at);

        writeln!(inner.file)?;
        writeln!(
            inner.file,
            "- Ended: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(inner.file, "- Duration: {}", format_duration(elapsed))?;
        inner
            .file
            .flush()
            .context("Failed to flush transcript footer")?;
        inner.finalized = true;

        info!(
            "Transcript session finalized: {} ({} lines)",
            self.path.display(),
            inner.lines
        );

        Ok(())
    }

    fn locked(&self) -> MutexGuard<'_, WriterInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn format_duration(elapsed: chrono::Duration) -> String {
    let total_secs = elapsed.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs % 3600) / 60,
        total_secs % 60
    )
}
