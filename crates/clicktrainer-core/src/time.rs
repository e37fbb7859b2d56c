/// Milliseconds since the Unix epoch. Clamps to 0 if the clock is before 1970.
pub fn unix_millis() -> u64 {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    dur.as_millis() as u64
}

/// Milliseconds elapsed from `earlier` to `later`, saturating at zero.
pub fn elapsed_ms(earlier: u64, later: u64) -> u64 {
    later.saturating_sub(earlier)
}
