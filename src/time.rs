/// Milliseconds since the Unix epoch.
///
/// All persisted timestamps (order lifecycle stamps, history rows) use this
/// unit; tick-window instants use the tick counter instead.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
