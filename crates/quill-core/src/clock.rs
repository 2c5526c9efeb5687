use chrono::Utc;

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
