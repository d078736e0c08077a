//! Time utilities used across signing.

use chrono::Utc;

/// DateTime in UTC, the only time representation the signer works with.
pub type DateTime = chrono::DateTime<Utc>;

/// Return the current UTC time.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format a time into the signing scope date: `20201021`.
pub fn format_date(t: DateTime) -> String {
    t.format("%Y%m%d").to_string()
}

/// Format a time into the compact ISO 8601 timestamp: `20201021T115411Z`.
pub fn format_iso8601(t: DateTime) -> String {
    t.format("%Y%m%dT%H%M%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_date_and_iso8601() {
        let t = Utc.with_ymd_and_hms(2020, 10, 21, 11, 54, 11).unwrap();
        assert_eq!(format_date(t), "20201021");
        assert_eq!(format_iso8601(t), "20201021T115411Z");
    }
}
