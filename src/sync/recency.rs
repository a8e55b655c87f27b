//! Relative "updated N ago" labels in Brazilian Portuguese.
//!
//! Each label is computed from one stamp and the device's current time.
//! Local and remote stamps are never subtracted from each other.

use crate::models::{LocalStamp, RemoteStamp, VersionStamp};

/// Shown when a version has no known timestamp.
pub const UNKNOWN: &str = "(desconhecido)";

const SECOND: i64 = 1_000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// "há 3 horas", "agora mesmo", ... for an elapsed duration in milliseconds.
///
/// Negative durations (a stamp ahead of the device clock) read as "agora mesmo".
pub fn elapsed_label(elapsed_ms: i64) -> String {
    let plural = |n: i64, one: &str, many: &str| {
        if n == 1 {
            format!("há 1 {}", one)
        } else {
            format!("há {} {}", n, many)
        }
    };

    match elapsed_ms {
        ms if ms < MINUTE => "agora mesmo".to_string(),
        ms if ms < HOUR => plural(ms / MINUTE, "minuto", "minutos"),
        ms if ms < DAY => plural(ms / HOUR, "hora", "horas"),
        ms if ms < MONTH => plural(ms / DAY, "dia", "dias"),
        ms if ms < YEAR => plural(ms / MONTH, "mês", "meses"),
        ms => plural(ms / YEAR, "ano", "anos"),
    }
}

/// "atualizado há ..." for a stamp of either origin, or [`UNKNOWN`].
pub fn label(stamp: Option<VersionStamp>, now_ms: i64) -> String {
    let elapsed_ms = match stamp {
        Some(VersionStamp::Local(stamp)) => now_ms - stamp.millis(),
        Some(VersionStamp::Remote(stamp)) => now_ms - stamp.instant().timestamp_millis(),
        None => return UNKNOWN.to_string(),
    };
    format!("atualizado {}", elapsed_label(elapsed_ms))
}

pub fn local_label(stamp: Option<LocalStamp>, now_ms: i64) -> String {
    label(stamp.map(VersionStamp::from), now_ms)
}

pub fn remote_label(stamp: Option<RemoteStamp>, now_ms: i64) -> String {
    label(stamp.map(VersionStamp::from), now_ms)
}
