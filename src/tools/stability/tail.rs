//! Incremental log-file reader.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Follows a log file from the position it had when monitoring started.
#[derive(Debug)]
pub struct LogTail {
    path: PathBuf,
    offset: u64,
}

impl LogTail {
    /// Start at the current end of `path` (or at 0 if it does not exist yet).
    pub async fn open(path: &Path) -> Self {
        let offset = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        Self {
            path: path.to_path_buf(),
            offset,
        }
    }

    /// Complete lines appended since the previous poll. A trailing partial
    /// line is left for the next poll. A shrunken file counts as rotated and is
    /// re-read from the start.
    pub async fn poll(&mut self) -> std::io::Result<Vec<String>> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let len = file.metadata().await?.len();
        if len < self.offset {
            tracing::debug!("{} shrank, assuming rotation", self.path.display());
            self.offset = 0;
        }
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;

        let complete = buf.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
        self.offset += complete as u64;
        Ok(String::from_utf8_lossy(&buf[..complete])
            .lines()
            .map(str::to_string)
            .collect())
    }
}

/// Lines worth surfacing as issues.
pub fn is_alert_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("warn") || lower.contains("error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_reads_only_appended_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "old line\n").unwrap();

        let mut tail = LogTail::open(&path).await;
        assert!(tail.poll().await.unwrap().is_empty());

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "WARN slow\npartial").unwrap();
        assert_eq!(tail.poll().await.unwrap(), vec!["WARN slow"]);

        writeln!(file, " now done").unwrap();
        assert_eq!(tail.poll().await.unwrap(), vec!["partial now done"]);
    }

    #[tokio::test]
    async fn test_rotation_restarts_from_top() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "a long first line\n").unwrap();
        let mut tail = LogTail::open(&path).await;

        std::fs::write(&path, "new\n").unwrap();
        assert_eq!(tail.poll().await.unwrap(), vec!["new"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let mut tail = LogTail::open(Path::new("/no/such/app.log")).await;
        assert!(tail.poll().await.unwrap().is_empty());
    }

    #[test]
    fn test_alert_lines() {
        assert!(is_alert_line("2024 WARN cache miss"));
        assert!(is_alert_line("Error: boom"));
        assert!(!is_alert_line("INFO ready"));
    }
}
