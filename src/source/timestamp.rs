use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use regex::{Captures, Regex};
use std::sync::LazyLock;

const DATE: &str = r"(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})";
const TIME: &str = r"(?P<hour>\d{2}):(?P<minute>\d{2}):(?P<second>\d{2})(?:\.(?P<frac>\d+))?";
const OFFSET: &str = r"(?P<offset>Z|[+-]\d{2}:?\d{2})?";
// What may follow a bare timestamp before the message starts.
const SEPARATOR: &str = r"(?::\s?|\s|$)";

/// Timestamp layouts recognised at the start of a line, in match priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `[2021-01-24T19:13:15.501+00:00]: message`, T or space separated
    Bracketed,
    /// `2021-01-24T19:13:15.501126+00:00 message`
    Iso8601,
    /// `2021-01-24 19:13:15.501+00:00 message`
    Legacy,
}

/// Outcome of matching a single decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineMatch<'a> {
    Recognized {
        layout: Layout,
        timestamp: DateTime<FixedOffset>,
        message: &'a str,
    },
    NotRecognized,
}

struct LayoutMatcher {
    layout: Layout,
    pattern: Regex,
}

static MATCHERS: LazyLock<Vec<LayoutMatcher>> = LazyLock::new(|| {
    let layouts = [
        (
            Layout::Bracketed,
            format!(r"^\[{DATE}[T ]{TIME}{OFFSET}\]{SEPARATOR}"),
        ),
        (Layout::Iso8601, format!(r"^{DATE}T{TIME}{OFFSET}{SEPARATOR}")),
        (Layout::Legacy, format!(r"^{DATE} {TIME}{OFFSET}{SEPARATOR}")),
    ];

    layouts
        .into_iter()
        .map(|(layout, pattern)| LayoutMatcher {
            layout,
            pattern: Regex::new(&pattern).expect("layout patterns are valid"),
        })
        .collect()
});

static INSTANT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^{DATE}[T ]{TIME}{OFFSET}$")).expect("instant pattern is valid")
});

/// Match a line against the known layouts, first match wins.
///
/// Leading whitespace is skipped. On a match the message is whatever follows
/// the timestamp and its separator, which may be empty.
pub fn parse_line(line: &str) -> LineMatch<'_> {
    let text = line.trim_start();

    for matcher in MATCHERS.iter() {
        let Some(captures) = matcher.pattern.captures(text) else {
            continue;
        };
        let Some(timestamp) = timestamp_from(&captures) else {
            continue;
        };
        let consumed = captures.get(0).map_or(0, |m| m.end());

        return LineMatch::Recognized {
            layout: matcher.layout,
            timestamp,
            message: &text[consumed..],
        };
    }

    LineMatch::NotRecognized
}

/// Parse a whole string as a single timestamp, T or space separated.
///
/// Used for stored markers, where nothing may follow the timestamp.
pub fn parse_instant(text: &str) -> Option<DateTime<FixedOffset>> {
    let captures = INSTANT.captures(text.trim())?;
    timestamp_from(&captures)
}

fn timestamp_from(captures: &Captures<'_>) -> Option<DateTime<FixedOffset>> {
    let number = |name: &str| captures.name(name)?.as_str().parse::<u32>().ok();

    let date = NaiveDate::from_ymd_opt(
        captures.name("year")?.as_str().parse().ok()?,
        number("month")?,
        number("day")?,
    )?;
    let nanos = match captures.name("frac") {
        Some(frac) => fraction_nanos(frac.as_str())?,
        None => 0,
    };
    let time = NaiveTime::from_hms_nano_opt(number("hour")?, number("minute")?, number("second")?, nanos)?;
    let naive = NaiveDateTime::new(date, time);

    match captures.name("offset") {
        Some(offset) => parse_offset(offset.as_str())?
            .from_local_datetime(&naive)
            .single(),
        None => local_instant(&naive),
    }
}

/// Resolve a wall-clock time in the local zone. Ambiguous times take the
/// earlier instant; times skipped by a forward transition keep the offset in
/// force before it.
fn local_instant(naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    match Local.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt.fixed_offset()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.fixed_offset()),
        LocalResult::None => {
            let before = Local
                .from_local_datetime(&(*naive - chrono::Duration::hours(24)))
                .earliest()?
                .fixed_offset();
            before.offset().from_local_datetime(naive).single()
        }
    }
}

/// Digits past nanosecond precision are dropped.
fn fraction_nanos(digits: &str) -> Option<u32> {
    let digits = digits.get(..9).unwrap_or(digits);
    format!("{:0<9}", digits).parse().ok()
}

fn parse_offset(value: &str) -> Option<FixedOffset> {
    if value == "Z" {
        return FixedOffset::east_opt(0);
    }

    let sign = if value.starts_with('-') { -1 } else { 1 };
    let digits: String = value[1..].chars().filter(|c| *c != ':').collect();
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..4)?.parse().ok()?;

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(text: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(text).unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, milli: u32) -> DateTime<FixedOffset> {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .earliest()
            .unwrap()
            .fixed_offset()
            + chrono::Duration::milliseconds(milli as i64)
    }

    fn recognized(line: &str) -> (Layout, DateTime<FixedOffset>, &str) {
        match parse_line(line) {
            LineMatch::Recognized {
                layout,
                timestamp,
                message,
            } => (layout, timestamp, message),
            LineMatch::NotRecognized => panic!("expected a timestamp in {line:?}"),
        }
    }

    #[test]
    fn test_iso8601_with_offset() {
        let (layout, ts, message) =
            recognized("2021-01-24T19:13:15.501126+00:00 kernel: Booting Linux");

        assert_eq!(layout, Layout::Iso8601);
        assert_eq!(ts, utc("2021-01-24T19:13:15.501126+00:00"));
        assert_eq!(message, "kernel: Booting Linux");
    }

    #[test]
    fn test_iso8601_zulu_and_compact_offset() {
        let (_, ts, _) = recognized("2025-12-04T02:42:11.011Z message");
        assert_eq!(ts, utc("2025-12-04T02:42:11.011+00:00"));

        let (_, ts, _) = recognized("2025-12-04T02:42:11+0530 message");
        assert_eq!(ts, utc("2025-12-03T21:12:11+00:00"));
    }

    #[test]
    fn test_offset_is_preserved_but_compares_by_instant() {
        let (_, ts, _) = recognized("2020-02-10T10:10:00+04:00 foo");

        assert_eq!(ts.offset().local_minus_utc(), 4 * 3600);
        assert_eq!(ts, utc("2020-02-10T06:10:00+00:00"));
    }

    #[test]
    fn test_legacy_space_separated() {
        let (layout, ts, message) = recognized("2020-01-01 00:00:01.400+00:00 foo");

        assert_eq!(layout, Layout::Legacy);
        assert_eq!(ts, utc("2020-01-01T00:00:01.400+00:00"));
        assert_eq!(message, "foo");
    }

    #[test]
    fn test_bracketed_layouts() {
        let (layout, ts, message) = recognized("[2020-01-01 00:00:01.500+00:00]: bar");
        assert_eq!(layout, Layout::Bracketed);
        assert_eq!(ts, utc("2020-01-01T00:00:01.500+00:00"));
        assert_eq!(message, "bar");

        let (layout, ts, message) = recognized("[2020-01-01T00:00:01.600+00:00] qux");
        assert_eq!(layout, Layout::Bracketed);
        assert_eq!(ts, utc("2020-01-01T00:00:01.600+00:00"));
        assert_eq!(message, "qux");
    }

    #[test]
    fn test_naive_timestamps_are_local_time() {
        let (_, ts, message) = recognized("2020-01-01T00:00:01.600: zap");
        assert_eq!(ts, local(2020, 1, 1, 0, 0, 1, 600));
        assert_eq!(message, "zap");

        let (_, ts, message) = recognized("2020-01-01T00:00:01.700 zappa dappa");
        assert_eq!(ts, local(2020, 1, 1, 0, 0, 1, 700));
        assert_eq!(message, "zappa dappa");
    }

    #[test]
    fn test_leading_whitespace_is_ignored() {
        let (_, ts, message) = recognized("    2021-01-24T19:13:15.501126+00:00 aardvark");

        assert_eq!(ts, utc("2021-01-24T19:13:15.501126+00:00"));
        assert_eq!(message, "aardvark");
    }

    #[test]
    fn test_offset_binds_to_timestamp_not_message() {
        // An offset directly after the time belongs to the timestamp.
        let (_, ts, message) = recognized("2020-01-01T00:00:01+02:00 foo");
        assert_eq!(ts, utc("2019-12-31T22:00:01+00:00"));
        assert_eq!(message, "foo");

        // Separated by whitespace it is message text, and the time is local.
        let (_, ts, message) = recognized("2020-01-01 00:00:01 +02:00 foo");
        assert_eq!(ts, local(2020, 1, 1, 0, 0, 1, 0));
        assert_eq!(message, "+02:00 foo");
    }

    #[test]
    fn test_bracketed_wins_over_bare_timestamp_in_message() {
        let (layout, ts, message) =
            recognized("[2020-01-01T00:00:01Z]: 2021-06-01T00:00:00Z nested");

        assert_eq!(layout, Layout::Bracketed);
        assert_eq!(ts, utc("2020-01-01T00:00:01+00:00"));
        assert_eq!(message, "2021-06-01T00:00:00Z nested");
    }

    #[test]
    fn test_empty_message() {
        let (_, _, message) = recognized("2020-01-01T00:00:01Z");
        assert_eq!(message, "");
    }

    #[test]
    fn test_malformed_timestamps_not_recognized() {
        for line in [
            "22021-01-24T19:13:15.501126+00:00 rsyslogd: start",
            "2021-13-24T19:13:15+00:00 month out of range",
            "2021-01-24T25:13:15+00:00 hour out of range",
            "2021-01-24T19:13:15.501126+00:00x glued",
            "2021-01-24T19:13:15+0x:00 bad offset",
            "  Stack trace line 1",
            "",
        ] {
            assert_eq!(parse_line(line), LineMatch::NotRecognized, "{line:?}");
        }
    }

    #[test]
    fn test_fraction_beyond_nanoseconds_is_truncated() {
        let (layout, ts, message) = recognized("2021-01-24T19:13:15.1234567891+00:00 precise");
        assert_eq!(layout, Layout::Iso8601);
        assert_eq!(ts, utc("2021-01-24T19:13:15.123456789+00:00"));
        assert_eq!(message, "precise");

        let (_, ts, _) = recognized("[2021-01-24 19:13:15.000000000999] trailing digits");
        assert_eq!(ts.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_parse_instant() {
        assert_eq!(
            parse_instant("2020-01-01T03:00:01.599+00:00\n"),
            Some(utc("2020-01-01T03:00:01.599+00:00"))
        );
        assert_eq!(
            parse_instant("2020-01-01T03:00:01.599"),
            Some(local(2020, 1, 1, 3, 0, 1, 599))
        );
        assert_eq!(parse_instant("2020-01-01T03:00:01 trailing"), None);
        assert_eq!(parse_instant("garbage"), None);
    }
}
