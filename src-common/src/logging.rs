//! Platform-specific logging directory resolution.

use std::path::PathBuf;

/// Application name used for project directories.
const APP_NAME: &str = "ajamedia";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/ajamedia/logs` or `~/.local/state/ajamedia/logs` |
/// | macOS | `~/Library/Logs/ajamedia` |
/// | Windows | `%LOCALAPPDATA%\ajamedia\ajamedia\logs` |
///
/// Falls back to `<tmp>/ajamedia/logs` when no home directory can be found.
pub fn log_dir() -> PathBuf {
    let Some(base) = project_dirs() else {
        return std::env::temp_dir().join(APP_NAME).join("logs");
    };

    #[cfg(target_os = "linux")]
    {
        base.state_dir()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().join("state"))
            .join("logs")
    }

    #[cfg(target_os = "macos")]
    {
        // data_local_dir is ~/Library/Application Support/ajamedia; logs live
        // under ~/Library/Logs/ajamedia.
        let library = base
            .data_local_dir()
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().to_path_buf());
        library.join("Logs").join(APP_NAME)
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        base.data_local_dir().join("logs")
    }
}

/// Ensures the log directory exists, creating it if necessary.
pub fn ensure_log_dir() -> Result<PathBuf, std::io::Error> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// File name prefix for the rolling log appender.
///
/// The appender creates dated files such as `ajamedia.2026-03-01.log`.
pub const LOG_FILE_PREFIX: &str = "ajamedia";
