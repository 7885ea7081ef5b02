//! Save key and path normalization
//!
//! A save key is the extension-agnostic, path-normalized identity of a
//! logical save within one user's library. Uploads additionally carry a
//! device-local path, which is normalized (but never invented) here.

use regex::Regex;

use crate::error::{Error, Result};

/// Normalize a save-key candidate: backslashes to forward slashes,
/// whitespace runs collapsed to a single space, trimmed. The result is
/// matched byte-exact and case-sensitive against existing saves.
#[must_use]
pub fn normalize_save_key(candidate: &str) -> String {
    let slashes = candidate.replace('\\', "/");
    let collapse = Regex::new(r"\s+").expect("valid regex");
    collapse.replace_all(&slashes, " ").trim().to_string()
}

/// Validate and normalize the upload's file path.
///
/// Strips a single leading slash and rejects any path containing a `..`
/// traversal sequence before any state is touched.
pub fn safe_file_path(file_path: &str) -> Result<String> {
    let stripped = file_path.strip_prefix('/').unwrap_or(file_path);
    if stripped.contains("..") {
        return Err(Error::InvalidInput("Invalid file path".to_string()));
    }
    Ok(stripped.to_string())
}

/// Resolve the device-local path a SaveLocation is keyed on.
///
/// Prefers the explicit `local_path` override, falls back to the upload's
/// file path. The result is always absolute, and a `.netplay` segment is
/// rewritten to its canonical equivalent so netplay-mode saves are not
/// tracked under a separate logical save.
#[must_use]
pub fn effective_local_path(safe_path: &str, local_path: Option<&str>) -> String {
    let chosen = local_path
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(safe_path);

    let absolute = if chosen.starts_with('/') {
        chosen.to_string()
    } else {
        format!("/{chosen}")
    };

    if absolute.contains("/.netplay/") {
        let normalized = absolute.replace("/.netplay/", "/");
        tracing::info!(from = %absolute, to = %normalized, "normalizing netplay path");
        normalized
    } else {
        absolute
    }
}

/// Display name for a save: the basename of the upload's file path.
#[must_use]
pub fn display_name_from_path(safe_path: &str) -> String {
    safe_path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or(safe_path)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_replaces_backslashes() {
        assert_eq!(
            normalize_save_key(r"ROMS\GBA\zelda.srm"),
            "ROMS/GBA/zelda.srm"
        );
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(
            normalize_save_key("  saves/Super   Mario  World "),
            "saves/Super Mario World"
        );
    }

    #[test]
    fn normalize_is_case_sensitive() {
        assert_ne!(normalize_save_key("Zelda"), normalize_save_key("zelda"));
    }

    #[test]
    fn safe_path_strips_leading_slash() {
        assert_eq!(safe_file_path("/saves/zelda.srm").unwrap(), "saves/zelda.srm");
        assert_eq!(safe_file_path("saves/zelda.srm").unwrap(), "saves/zelda.srm");
    }

    #[test]
    fn safe_path_rejects_traversal() {
        assert!(safe_file_path("saves/../../etc/passwd").is_err());
        assert!(safe_file_path("..").is_err());
    }

    #[test]
    fn effective_path_prefers_override_and_is_absolute() {
        assert_eq!(
            effective_local_path("saves/zelda.srm", Some("/mnt/sd/saves/zelda.srm")),
            "/mnt/sd/saves/zelda.srm"
        );
        assert_eq!(
            effective_local_path("saves/zelda.srm", None),
            "/saves/zelda.srm"
        );
        assert_eq!(
            effective_local_path("saves/zelda.srm", Some("   ")),
            "/saves/zelda.srm"
        );
    }

    #[test]
    fn effective_path_rewrites_netplay_segment() {
        assert_eq!(
            effective_local_path("saves/.netplay/zelda.srm", None),
            "/saves/zelda.srm"
        );
    }

    #[test]
    fn display_name_is_basename() {
        assert_eq!(display_name_from_path("saves/gba/zelda.srm"), "zelda.srm");
        assert_eq!(display_name_from_path("zelda.srm"), "zelda.srm");
        assert_eq!(display_name_from_path("saves/gba/"), "gba");
    }
}
