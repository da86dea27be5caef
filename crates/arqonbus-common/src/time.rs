use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as milliseconds since the Unix epoch.
///
/// Clamped to zero on clock error (pre-epoch system clock) rather than
/// panicking — callers use this for clock-skew checks and telemetry
/// timestamps, never for ordering guarantees.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Absolute difference between two millisecond timestamps.
pub fn skew_ms(a: u64, b: u64) -> u64 {
    a.abs_diff(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skew_is_symmetric() {
        assert_eq!(skew_ms(100, 150), 50);
        assert_eq!(skew_ms(150, 100), 50);
    }

    #[test]
    fn now_ms_is_nonzero() {
        assert!(now_ms() > 0);
    }
}
