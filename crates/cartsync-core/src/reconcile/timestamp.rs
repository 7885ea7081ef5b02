//! Client timestamp sanitization
//!
//! Devices report file mtimes from wildly different clock sources: some have
//! no RTC at all, some report a CRC or garbage value when the filesystem stat
//! fails. Sanitization always yields a usable in-range timestamp so the
//! upload can proceed; whether the value was a *real* mtime is recovered
//! later by comparing it against the upload time.

use serde::Deserialize;

/// Anything before 2020-01-01T00:00:00Z is treated as a broken device clock
pub const MIN_VALID_MTIME_MS: i64 = 1_577_836_800_000;

/// Tolerance for clock drift into the future (1 hour)
pub const MAX_FUTURE_DRIFT_MS: i64 = 60 * 60 * 1000;

/// A local mtime within this distance of the upload time is considered
/// fallback-equivalent (likely the same source clock)
pub const FALLBACK_DELTA_MS: i64 = 5000;

/// A client-supplied modification time, as it appears on the wire:
/// either a numeric epoch in milliseconds or an ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

impl RawTimestamp {
    fn parse_ms(&self) -> Option<i64> {
        match self {
            Self::Millis(ms) if *ms > 0 => Some(*ms),
            Self::Millis(_) => None,
            Self::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return None;
                }
                chrono::DateTime::parse_from_rfc3339(text)
                    .ok()
                    .map(|parsed| parsed.timestamp_millis())
            }
        }
    }
}

/// Normalize a client-supplied mtime against the server receipt time.
///
/// Absent or unparseable values fall back to `now_ms`. Parseable values
/// outside `[2020-01-01, now + 1h]` are clamped to `now_ms` rather than
/// rejected: the upload must still succeed.
pub fn sanitize_timestamp(raw: Option<&RawTimestamp>, now_ms: i64) -> i64 {
    let Some(parsed_ms) = raw.and_then(RawTimestamp::parse_ms) else {
        tracing::debug!("no usable local mtime provided, using upload time");
        return now_ms;
    };

    if parsed_ms > now_ms + MAX_FUTURE_DRIFT_MS {
        tracing::warn!(
            raw_ms = parsed_ms,
            drift_ms = parsed_ms - now_ms,
            "clamping future mtime to upload time"
        );
        return now_ms;
    }

    if parsed_ms < MIN_VALID_MTIME_MS {
        tracing::warn!(raw_ms = parsed_ms, "clamping pre-2020 mtime to upload time");
        return now_ms;
    }

    parsed_ms
}

/// Whether a stored mtime is trustworthy, i.e. differs meaningfully from the
/// time the version was uploaded. Values within [`FALLBACK_DELTA_MS`] of the
/// upload time are effectively "time of upload".
#[must_use]
pub const fn has_real_mtime(local_modified_at_ms: i64, uploaded_at_ms: i64) -> bool {
    (uploaded_at_ms - local_modified_at_ms).abs() > FALLBACK_DELTA_MS
}
