//! User-data resolution for new instances.
//!
//! Linux instances receive the configured file's contents verbatim.
//! Windows instances need the payload wrapped in a single
//! `<script>…</script>` delimiter pair so the launch agent executes it on
//! first boot. An unreadable file is a warning, not a failure: provisioning
//! continues with user-data disabled.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::warn;

/// Opening delimiter recognised by the Windows launch agent.
const SCRIPT_OPEN: &str = "<script>";
/// Closing delimiter recognised by the Windows launch agent.
const SCRIPT_CLOSE: &str = "</script>";

/// Resolves the user-data payload for the instance.
///
/// Returns `None` when no file is configured, when the configured file
/// cannot be read (logged as a warning), or when a Windows payload
/// collapses to an empty script block.
#[must_use]
pub fn resolve(file: Option<&str>, windows: bool) -> Option<String> {
    let path = file?;
    let expanded = expand_tilde(path);
    let content = match read_to_string_ambient(&expanded) {
        Ok(content) => content,
        Err(message) => {
            warn!(path = %expanded, %message, "could not read user-data file; continuing without user-data");
            return None;
        }
    };

    if windows {
        wrap_windows(&content)
    } else {
        Some(content)
    }
}

/// Wraps a Windows payload in a single script-block delimiter pair.
///
/// A payload that already carries the opening marker is passed through
/// unchanged so the delimiters are never doubled; an empty payload
/// collapses to nothing rather than an empty block.
#[must_use]
pub fn wrap_windows(payload: &str) -> Option<String> {
    if payload.trim().is_empty() {
        return None;
    }
    if payload.contains(SCRIPT_OPEN) {
        return Some(payload.to_owned());
    }
    Some(format!("{SCRIPT_OPEN}\n{payload}\n{SCRIPT_CLOSE}"))
}

/// Expands a leading `~/` to the caller's home directory.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    path.strip_prefix("~/").map_or_else(
        || path.to_owned(),
        |rest| {
            std::env::var("HOME").map_or_else(
                |_| path.to_owned(),
                |home| format!("{}/{rest}", home.trim_end_matches('/')),
            )
        },
    )
}

fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let path_buf = Utf8Path::new(path);

    let (dir_path, file_path) = if path_buf.is_absolute() {
        let parent = path_buf
            .parent()
            .ok_or_else(|| format!("path has no parent directory: {path_buf}"))?;
        let file_name = path_buf
            .file_name()
            .ok_or_else(|| format!("path has no file name: {path_buf}"))?;
        (parent, Utf8Path::new(file_name))
    } else {
        (Utf8Path::new("."), path_buf)
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_path).map_err(|err| err.to_string())
}
