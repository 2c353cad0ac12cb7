//! `H:MM:SS[.fff]` durations as used by DIDL-Lite and AVTransport.

/// Parse a duration into whole seconds. Fractions are truncated.
///
/// Accepts `H:MM:SS`, `MM:SS` and a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let whole = value.split('.').next().unwrap_or(value);

    let mut total: u32 = 0;
    for part in whole.split(':') {
        let n: u32 = part.trim().parse().ok()?;
        total = total.checked_mul(60)?.checked_add(n)?;
    }
    Some(total)
}

/// Format seconds as `H:MM:SS`.
pub fn format_duration(seconds: u32) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0:03:58", Some(238))]
    #[case("1:00:00.500", Some(3600))]
    #[case("04:05", Some(245))]
    #[case("42", Some(42))]
    #[case("", None)]
    #[case("NOT_IMPLEMENTED", None)]
    fn test_parse_duration(#[case] input: &str, #[case] expected: Option<u32>) {
        assert_eq!(parse_duration(input), expected);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(238), "0:03:58");
        assert_eq!(format_duration(3725), "1:02:05");
    }
}
