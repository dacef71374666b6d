use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::domain::terminal_state::TimestampMs;

/// Log timestamps are rendered in Moscow wall-clock time (fixed UTC+3).
const MOSCOW_OFFSET_SECONDS: i32 = 3 * 3600;

pub fn format_moscow_time(timestamp: TimestampMs) -> String {
    moscow_datetime(timestamp).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn format_moscow_time_iso(timestamp: TimestampMs) -> String {
    moscow_datetime(timestamp)
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string()
}

fn moscow_datetime(timestamp: TimestampMs) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(MOSCOW_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix());
    let utc = DateTime::<Utc>::from_timestamp_millis(timestamp.0)
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH));
    utc.with_timezone(&offset)
}

/// Formats an offline stretch as a largest-unit-first breakdown with Russian
/// unit suffixes, e.g. "1д 1ч 1м 1с". Zero-valued units are omitted; seconds
/// are always shown when everything else is zero.
pub fn format_offline_duration(duration_ms: i64) -> String {
    let total_seconds = duration_ms.max(0) / 1_000;
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{days}д"));
    }
    if hours > 0 {
        parts.push(format!("{hours}ч"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}м"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds}с"));
    }

    parts.join(" ")
}
