//! Session journal with timestamps

use crate::utils::Utils;
use crate::{Error, Result};
use chrono::{Local, Utc};
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const RULE: &str = "\n----------------------------------------\n";

/// Append-only journal of committed engine operations.
///
/// Every line is prefixed with elapsed seconds and the delta to the
/// previous entry. Clones share the same file.
#[derive(Clone)]
pub struct SessionLog {
    inner: Arc<SessionLogInner>,
}

struct SessionLogInner {
    path: PathBuf,
    state: Mutex<LogState>,
    start: Instant,
    echo: bool,
}

struct LogState {
    writer: BufWriter<File>,
    last_seconds: f32,
    entries: usize,
}

impl SessionLog {
    /// Create the journal at `path`, or a timestamped file in the temp
    /// directory when `None`.
    pub fn new(path: Option<&Path>, echo: bool) -> Result<Self> {
        let path = match path {
            Some(path) if !path.as_os_str().is_empty() => path.to_path_buf(),
            _ => env::temp_dir().join(Utils::date_time_filename("voxseg_", ".log")),
        };

        let file = File::create(&path).map_err(|e| {
            Error::FileSave(format!("Unable to create file {}: {}", path.display(), e))
        })?;

        let log = Self {
            inner: Arc::new(SessionLogInner {
                path: path.clone(),
                state: Mutex::new(LogState {
                    writer: BufWriter::new(file),
                    last_seconds: 0.0,
                    entries: 0,
                }),
                start: Instant::now(),
                echo,
            }),
        };

        log.log(format!("Opened {}", path.display()))?;
        log.log(RULE)?;
        log.log_time()?;
        log.log(RULE)?;
        log.log(format!(
            "Processor Count:      {}",
            std::thread::available_parallelism()
                .map(|c| c.get())
                .unwrap_or(0)
        ))?;
        log.log(format!("Operating System      {}", env::consts::OS))?;
        log.log(RULE)?;

        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Number of lines written so far, header included.
    pub fn entries(&self) -> usize {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
    }

    pub fn log(&self, message: impl AsRef<str>) -> Result<()> {
        self.inner.log_lines(message.as_ref())
    }

    pub fn log_time(&self) -> Result<()> {
        self.log(format!(
            "Current time (UTC): {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S (UTC)")
        ))?;
        self.log(format!(
            "Current local time: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S (%z)")
        ))
    }
}

impl SessionLogInner {
    fn log_lines(&self, message: &str) -> Result<()> {
        let seconds = self.start.elapsed().as_secs_f32();

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let diff = seconds - state.last_seconds;
        let prefix = format!("{:7.0}s {:6.1}+ ", seconds, diff);

        for line in message.split('\n') {
            if self.echo {
                println!("{}{}", prefix, line);
            }
            state.writer.write_all(prefix.as_bytes())?;
            state.writer.write_all(line.as_bytes())?;
            state.writer.write_all(b"\n")?;
            state.entries += 1;
        }
        state.writer.flush()?;
        state.last_seconds = seconds;

        Ok(())
    }
}

impl Drop for SessionLogInner {
    fn drop(&mut self) {
        let _ = self.log_lines(RULE);
        let _ = self.log_lines("Closing session log.");
        let _ = self.log_lines(&format!(
            "Current time (UTC): {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S (UTC)")
        ));
        let _ = self.log_lines("Done.");
    }
}
