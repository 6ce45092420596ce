//! Human-readable duration parsing for command-line options.

use std::time::Duration;

/// Parse a duration from a human-readable string.
///
/// Supports the following suffixes:
/// - `s` or no suffix: seconds
/// - `m`: minutes
/// - `h`: hours
/// - `ms`: milliseconds
///
/// # Examples
/// ```
/// use scale_bridge::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
/// assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
/// assert_eq!(parse_duration("100ms").unwrap(), Duration::from_millis(100));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();

    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" must be checked before "m" and "s"
    let (num, unit_ms) = if let Some(num) = src.strip_suffix("ms") {
        (num, 1)
    } else if let Some(num) = src.strip_suffix('h') {
        (num, 3_600_000)
    } else if let Some(num) = src.strip_suffix('m') {
        (num, 60_000)
    } else if let Some(num) = src.strip_suffix('s') {
        (num, 1000)
    } else {
        (src, 1000)
    };

    let count: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {}", src))?;

    count
        .checked_mul(unit_ms)
        .map(Duration::from_millis)
        .ok_or_else(|| format!("duration out of range: {}", src))
}

/// Like [`parse_duration`], but rejects zero.
///
/// Used for intervals that pace a polling loop, where zero would spin.
pub fn parse_nonzero_duration(src: &str) -> Result<Duration, String> {
    let duration = parse_duration(src)?;
    if duration.is_zero() {
        return Err(format!("duration must be greater than zero: {}", src.trim()));
    }
    Ok(duration)
}
