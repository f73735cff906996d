//! Feed date parsing.

use chrono::{DateTime, FixedOffset};
use tracing::debug;

/// Parse an RSS date (RFC 2822).
///
/// Feeds in the wild sometimes carry a two-digit year; such dates are
/// retried with the year widened to `20YY`. RFC 3339 is accepted as a last
/// resort.
///
/// # Returns
///
/// `None` when the text is not a usable date. An invalid date is never
/// fatal to the parse that found it.
pub fn parse_feed_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(text) {
        return Some(date);
    }
    if let Some(widened) = widen_two_digit_year(text) {
        if let Ok(date) = DateTime::parse_from_rfc2822(&widened) {
            return Some(date);
        }
    }
    match DateTime::parse_from_rfc3339(text) {
        Ok(date) => Some(date),
        Err(e) => {
            debug!(%text, error = %e, "Unparseable feed date");
            None
        }
    }
}

/// Rewrite `Thu, 03 Jan 13 10:00:00 +0100` as `Thu, 03 Jan 2013 10:00:00 +0100`.
fn widen_two_digit_year(text: &str) -> Option<String> {
    let (prefix, rest) = match text.split_once(',') {
        Some((weekday, rest)) => (format!("{weekday}, "), rest),
        None => (String::new(), text),
    };
    let mut fields: Vec<String> = rest.split_whitespace().map(str::to_string).collect();
    let year = fields.get_mut(2)?;
    if year.len() != 2 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    year.insert_str(0, "20");
    Some(format!("{prefix}{}", fields.join(" ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_standard_date() {
        let d = parse_feed_date("Sun, 06 Jan 2013 08:15:00 +0100").unwrap();
        assert_eq!((d.year(), d.month(), d.day(), d.hour()), (2013, 1, 6, 8));
    }

    #[test]
    fn test_two_digit_year_is_widened() {
        assert_eq!(
            widen_two_digit_year("Thu, 03 Jan 13 10:00:00 +0100").as_deref(),
            Some("Thu, 03 Jan 2013 10:00:00 +0100")
        );
        let d = parse_feed_date("Thu, 03 Jan 13 10:00:00 +0100").unwrap();
        assert_eq!(d.year(), 2013);
    }

    #[test]
    fn test_widening_leaves_four_digit_years_alone() {
        assert_eq!(widen_two_digit_year("03 Jan 2013 10:00:00 GMT"), None);
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_feed_date("yesterday-ish"), None);
        assert_eq!(parse_feed_date("   "), None);
    }

    #[test]
    fn test_rfc3339_fallback() {
        assert!(parse_feed_date("2013-01-03T10:00:00+01:00").is_some());
    }
}
