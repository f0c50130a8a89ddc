use crate::listen_store::DatePrecision;
use chrono::NaiveDate;

/// Parses an upstream release date according to its precision tag.
///
/// `"year"` expects a four digit year and yields January 1st of it, `"day"`
/// expects `YYYY-MM-DD`. Other precisions, empty input or unparseable text
/// yield `None`.
pub fn parse_release_date(raw: &str, precision: &str) -> Option<NaiveDate> {
    if raw.is_empty() {
        return None;
    }
    match DatePrecision::parse(precision) {
        DatePrecision::Year => {
            if raw.len() != 4 || !raw.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            NaiveDate::from_ymd_opt(raw.parse().ok()?, 1, 1)
        }
        DatePrecision::Day => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
        DatePrecision::Unknown => None,
    }
}

/// The stored date together with the precision tag that qualifies it.
///
/// The tag is `Unknown` whenever no date could be parsed.
pub fn normalize_release_date(
    raw: Option<&str>,
    precision: Option<&str>,
) -> (Option<NaiveDate>, DatePrecision) {
    let precision = precision.unwrap_or_default();
    match parse_release_date(raw.unwrap_or_default(), precision) {
        Some(date) => (Some(date), DatePrecision::parse(precision)),
        None => (None, DatePrecision::Unknown),
    }
}
