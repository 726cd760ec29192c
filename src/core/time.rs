use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub(crate) fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub(crate) fn format_offset(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

/// Whole seconds between `started_at` and `until`, never negative.
pub(crate) fn elapsed_seconds(started_at: OffsetDateTime, until: OffsetDateTime) -> u64 {
    let seconds = (until - started_at).whole_seconds();
    if seconds < 0 {
        0
    } else {
        seconds as u64
    }
}

/// Countdown rendering used by the timer banner, `MM:SS`.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::{Date, Duration, PrimitiveDateTime, Time, UtcOffset};

    fn fixed() -> OffsetDateTime {
        let date = Date::from_calendar_date(2025, time::Month::January, 2).unwrap();
        let time = Time::from_hms(10, 20, 30).unwrap();
        PrimitiveDateTime::new(date, time).assume_utc()
    }

    #[test]
    fn format_offset_preserves_offset() {
        let offset = UtcOffset::from_hms(3, 0, 0).unwrap();
        assert_eq!(format_offset(fixed().to_offset(offset)), "2025-01-02T13:20:30+03:00");
    }

    #[test]
    fn elapsed_seconds_truncates_and_clamps() {
        let start = fixed();
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(61_900)), 61);
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(5)), 0);
    }

    #[test]
    fn format_clock_pads_minutes_and_seconds() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(59), "00:59");
        assert_eq!(format_clock(600), "10:00");
        assert_eq!(format_clock(3_725), "62:05");
    }
}
