use crate::source::timestamp::parse_instant;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Suffix appended to a source path to name its resume marker.
pub const MARKER_SUFFIX: &str = ".lus";

/// Sidecar marker path for a source file: `device.log` -> `device.log.lus`.
pub fn marker_path(source: &Path) -> PathBuf {
    with_suffix(source, MARKER_SUFFIX)
}

/// Read a stored marker. Missing, unreadable and unparseable markers all
/// read as `None`.
pub fn read_marker(path: &Path) -> Option<DateTime<FixedOffset>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Unreadable resume marker, ignoring it");
            return None;
        }
    };

    let marker = parse_instant(&text);
    if marker.is_none() {
        tracing::warn!(path = %path.display(), "Unparseable resume marker, ignoring it");
    }
    marker
}

/// Replace the marker with `instant`.
///
/// The new value is written to a sibling file and renamed into place, so
/// readers observe either the old marker or the new one.
pub fn persist_marker(path: &Path, instant: DateTime<FixedOffset>) -> io::Result<()> {
    let tmp_path = with_suffix(path, ".tmp");

    {
        let mut file = File::create(&tmp_path)?;
        writeln!(file, "{}", instant.to_rfc3339_opts(SecondsFormat::AutoSi, false))?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Resume marker bound to one location.
#[derive(Debug, Clone)]
pub struct ResumeState {
    path: PathBuf,
}

impl ResumeState {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<DateTime<FixedOffset>> {
        let marker = read_marker(&self.path);
        match marker {
            Some(ts) => tracing::info!(path = %self.path.display(), marker = %ts, "Loaded resume marker"),
            None => tracing::info!(path = %self.path.display(), "No resume marker found"),
        }
        marker
    }

    pub fn save(&self, instant: DateTime<FixedOffset>) -> io::Result<()> {
        persist_marker(&self.path, instant)?;
        tracing::debug!(path = %self.path.display(), marker = %instant, "Resume marker saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;

    #[test]
    fn test_marker_path() {
        assert_eq!(
            marker_path(Path::new("/var/log/serial/device.log")),
            PathBuf::from("/var/log/serial/device.log.lus")
        );
    }

    #[test]
    fn test_missing_marker() {
        let dir = TempDir::new().unwrap();
        assert!(read_marker(&dir.path().join("absent.lus")).is_none());
    }

    #[test]
    fn test_unparseable_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device.log.lus");
        fs::write(&path, "not a timestamp").unwrap();

        assert!(read_marker(&path).is_none());
    }

    #[test]
    fn test_marker_with_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device.log.lus");
        fs::write(&path, "2020-01-01T03:00:01.599+00:00").unwrap();

        assert_eq!(
            read_marker(&path),
            Some(DateTime::parse_from_rfc3339("2020-01-01T03:00:01.599+00:00").unwrap())
        );
    }

    #[test]
    fn test_marker_without_offset_is_local() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device.log.lus");
        fs::write(&path, "2020-01-01T03:00:01.599\n").unwrap();

        let expected = Local
            .with_ymd_and_hms(2020, 1, 1, 3, 0, 1)
            .earliest()
            .unwrap()
            + chrono::Duration::milliseconds(599);
        assert_eq!(read_marker(&path), Some(expected.fixed_offset()));
    }

    #[test]
    fn test_persist_overwrites_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let state = ResumeState::new(marker_path(&dir.path().join("device.log")));

        let first = DateTime::parse_from_rfc3339("2021-01-24T19:12:35.143909+00:00").unwrap();
        let second = DateTime::parse_from_rfc3339("2021-01-24T21:13:15.501126+02:00").unwrap();

        state.save(first).unwrap();
        assert_eq!(state.load(), Some(first));

        state.save(second).unwrap();
        assert_eq!(state.load(), Some(second));
        assert_eq!(
            fs::read_to_string(state.path()).unwrap(),
            "2021-01-24T21:13:15.501126+02:00\n"
        );
        assert!(!with_suffix(state.path(), ".tmp").exists());
    }
}
