/// System module: duration rendering, shell quoting, logging macros, path helpers

pub mod paths;

use std::borrow::Cow;
use std::time::Duration;

/// Render whole seconds as `45s`, `2m5s` or `1h2m5s`.
///
/// No zero padding, and every unit below the largest non-zero one is shown.
pub fn format_secs(secs: u64) -> String {
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// [`format_secs`] for a `Duration`, truncating sub-second precision.
pub fn format_duration(d: Duration) -> String {
    format_secs(d.as_secs())
}

/// Quote a single argument for a POSIX shell on the remote side.
pub fn quote(arg: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(arg)).into_owned()
}

/// Quote and join a list of values into one space-separated shell word.
pub fn quote_list(items: &[String]) -> String {
    quote(&items.join(" "))
}

/// Logging macros for convenient access
/// Use the log crate directly for target-aware routing
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        log::info!("{}", msg);
    }}
}

#[macro_export]
macro_rules! log_parsed {
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        // Use target="parsed" for high-level milestones
        log::info!(target: "parsed", "{}", msg);
    }}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_secs_table() {
        assert_eq!(format_secs(0), "0s");
        assert_eq!(format_secs(45), "45s");
        assert_eq!(format_secs(59), "59s");
        assert_eq!(format_secs(60), "1m0s");
        assert_eq!(format_secs(125), "2m5s");
        assert_eq!(format_secs(3599), "59m59s");
        assert_eq!(format_secs(3600), "1h0m0s");
        assert_eq!(format_secs(3725), "1h2m5s");
    }

    #[test]
    fn test_format_duration_truncates() {
        assert_eq!(format_duration(Duration::from_millis(59_999)), "59s");
    }

    #[test]
    fn test_quote_plain_and_special() {
        assert_eq!(quote("software.example.org"), "software.example.org");
        assert_eq!(quote("a b"), "'a b'");
        assert_eq!(quote_list(&["a".into(), "b".into()]), "'a b'");
    }
}
