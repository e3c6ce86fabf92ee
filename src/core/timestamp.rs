use chrono::{Local, NaiveDateTime, Timelike};

/// Compact file-name timestamp, e.g. `20240305_143000`.
pub const COMPACT_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const SECS_PER_DAY: f64 = 86_400.0;

/// Local wall-clock time truncated to whole seconds.
pub fn local_now() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn format_compact(ts: &NaiveDateTime) -> String {
    ts.format(COMPACT_FORMAT).to_string()
}

pub fn parse_compact(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, COMPACT_FORMAT).ok()
}

/// Age of `then` relative to `now` in fractional days; negative for future timestamps.
pub fn age_days(now: &NaiveDateTime, then: &NaiveDateTime) -> f64 {
    (*now - *then).num_seconds() as f64 / SECS_PER_DAY
}
