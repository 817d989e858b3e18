//! Terminal progress for ingestion, and a log writer that keeps bars pinned
//! below log output.

use crate::meta::{FileStatus, MetaDb};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::fmt::MakeWriter;

static BARS: OnceLock<MultiProgress> = OnceLock::new();

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn bars() -> &'static MultiProgress {
    BARS.get_or_init(|| {
        let bars = MultiProgress::new();
        bars.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        bars
    })
}

/// A bar counting files that reached a terminal status
pub fn ingestion_bar(files: u64) -> ProgressBar {
    let bar = bars().add(ProgressBar::new(files));
    if let Ok(style) =
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} files {msg}")
    {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Poll file rows and advance `bar` until every file is PROCESSED or
/// PROCESS_FAILED. Returns the number that failed.
pub async fn track_files(db: MetaDb, file_ids: Vec<String>, bar: ProgressBar) -> usize {
    loop {
        let mut done = 0;
        let mut failed = 0;
        for id in &file_ids {
            match db.get_indexed_file(id).await {
                Ok(Some(file)) => match file.get_status() {
                    Ok(status) if status.is_terminal() => {
                        done += 1;
                        if status == FileStatus::ProcessFailed {
                            failed += 1;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Unreadable status on {}: {}", id, e),
                },
                // Deleted rows no longer need waiting for
                Ok(None) => done += 1,
                Err(e) => debug!("Progress poll failed: {}", e),
            }
        }

        bar.set_position(done as u64);
        if failed > 0 {
            bar.set_message(format!("({} failed)", failed));
        }
        if done == file_ids.len() {
            bar.finish();
            return failed;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Routes formatted log lines through the progress bars
#[derive(Default, Clone)]
pub struct LogWriterFactory;

/// Buffers partial writes and prints complete lines above the bars
pub struct LogWriter {
    pending: String,
}

fn print_line(line: &str) {
    let _ = bars().println(line.trim_end_matches('\r'));
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.push_str(&String::from_utf8_lossy(buf));
        while let Some(end) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=end).collect();
            print_line(line.trim_end_matches('\n'));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            print_line(line.trim_end_matches('\n'));
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            pending: String::new(),
        }
    }
}
