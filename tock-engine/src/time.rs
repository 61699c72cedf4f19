//! Wall-clock sampling for IANA timezones.
//!
//! A `TimeSource` supplies "now"; the sampler turns an instant and a zone
//! into the digits a face should show. All faces of one tick are sampled
//! against the same instant.

use crate::common::{Rgb, BLANK, FULL_DIGITS};
use crate::error::{Result, TockError};
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Supplies the current instant.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The AM/PM designator shown in a face's period label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Am,
    Pm,
}

impl Period {
    pub fn as_str(self) -> &'static str {
        match self {
            Period::Am => "AM",
            Period::Pm => "PM",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The display digits for one instant in one zone.
///
/// Positions are `[H10, H1, M10, M1, S10, S1]`. H10 is `BLANK` for hours
/// 1 through 9; a 12-hour clock never shows a leading zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSample {
    pub digits: [char; FULL_DIGITS],
    pub period: Period,
}

impl TimeSample {
    /// The first `count` digits, clamped to the six available.
    pub fn truncated(&self, count: usize) -> Vec<char> {
        self.digits[..count.min(FULL_DIGITS)].to_vec()
    }
}

/// Day/night gradient indexed by local 24-hour hour.
///
/// Hours 6 through 17 are warm daylight tones, 18 through 5 cool night tones.
pub const PERIOD_COLORS: [Rgb; 24] = [
    Rgb(0x3b, 0x4a, 0x7a),
    Rgb(0x38, 0x46, 0x76),
    Rgb(0x36, 0x43, 0x72),
    Rgb(0x38, 0x48, 0x6f),
    Rgb(0x3f, 0x50, 0x70),
    Rgb(0x4a, 0x5a, 0x78),
    Rgb(0xc9, 0x8a, 0x5a),
    Rgb(0xd6, 0x98, 0x5c),
    Rgb(0xe0, 0xa8, 0x62),
    Rgb(0xe6, 0xb8, 0x6a),
    Rgb(0xec, 0xc4, 0x74),
    Rgb(0xf0, 0xcc, 0x7c),
    Rgb(0xf2, 0xd0, 0x84),
    Rgb(0xf0, 0xca, 0x7c),
    Rgb(0xec, 0xc2, 0x74),
    Rgb(0xe6, 0xb4, 0x6a),
    Rgb(0xde, 0xa2, 0x62),
    Rgb(0xd2, 0x8e, 0x58),
    Rgb(0x6a, 0x6a, 0x9a),
    Rgb(0x5c, 0x5e, 0x90),
    Rgb(0x52, 0x56, 0x88),
    Rgb(0x4a, 0x4f, 0x82),
    Rgb(0x44, 0x4a, 0x7e),
    Rgb(0x3f, 0x47, 0x7c),
];

/// Parses an IANA identifier, reporting unknown zones as `InvalidTimezone`.
pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.trim()
        .parse::<Tz>()
        .map_err(|_| TockError::InvalidTimezone(tz.to_string()))
}

fn digit(n: u32) -> char {
    char::from(b'0' + (n % 10) as u8)
}

/// Samples the digits and period for `tz` at `at`.
pub fn sample_at(tz: Tz, at: DateTime<Utc>) -> TimeSample {
    let local = at.with_timezone(&tz);
    let (is_pm, hour) = local.hour12();
    let (minute, second) = (local.minute(), local.second());

    let h10 = if hour >= 10 { digit(hour / 10) } else { BLANK };
    TimeSample {
        digits: [
            h10,
            digit(hour),
            digit(minute / 10),
            digit(minute),
            digit(second / 10),
            digit(second),
        ],
        period: if is_pm { Period::Pm } else { Period::Am },
    }
}

/// Maps a 24-hour hour onto the period gradient. Hour 24 wraps to midnight.
pub fn period_color_for_hour(hour: u32) -> Rgb {
    PERIOD_COLORS[(hour % 24) as usize]
}

pub fn period_color_at(tz: Tz, at: DateTime<Utc>) -> Rgb {
    period_color_for_hour(at.with_timezone(&tz).hour())
}

/// Three-letter uppercase weekday, e.g. `"TUE"`.
pub fn day_abbrev_at(tz: Tz, at: DateTime<Utc>) -> String {
    at.with_timezone(&tz).weekday().to_string().to_uppercase()
}

/// The city's weekday if it differs from the reference zone's, else `None`.
pub fn day_offset_at(city: Tz, reference: Tz, at: DateTime<Utc>) -> Option<String> {
    let city_day = day_abbrev_at(city, at);
    (city_day != day_abbrev_at(reference, at)).then_some(city_day)
}

/// Samples time for string zone identifiers against a `TimeSource`.
#[derive(Clone)]
pub struct TimeSampler {
    source: Arc<dyn TimeSource>,
}

impl TimeSampler {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self { source }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemTimeSource))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.source.now()
    }

    pub fn sample(&self, tz: &str) -> Result<TimeSample> {
        Ok(sample_at(parse_timezone(tz)?, self.now()))
    }

    pub fn sample_period_color(&self, tz: &str) -> Result<Rgb> {
        Ok(period_color_at(parse_timezone(tz)?, self.now()))
    }

    pub fn sample_day_abbrev(&self, tz: &str) -> Result<String> {
        Ok(day_abbrev_at(parse_timezone(tz)?, self.now()))
    }
}

impl fmt::Debug for TimeSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeSampler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn morning_hour_is_blank_padded() {
        let sample = sample_at(Tz::UTC, utc(9, 5, 7));
        assert_eq!(sample.digits, [BLANK, '9', '0', '5', '0', '7']);
        assert_eq!(sample.period, Period::Am);
    }

    #[test]
    fn hour_never_starts_with_zero() {
        for hour in 0..24 {
            let sample = sample_at(Tz::UTC, utc(hour, 30, 0));
            assert_ne!(sample.digits[0], '0', "hour {hour}");
        }
    }

    #[test]
    fn two_digit_hours_are_untouched() {
        assert_eq!(sample_at(Tz::UTC, utc(10, 0, 0)).digits[..2], ['1', '0']);
        assert_eq!(sample_at(Tz::UTC, utc(23, 0, 0)).digits[..2], ['1', '1']);
        let noon = sample_at(Tz::UTC, utc(12, 0, 0));
        assert_eq!(noon.digits[..2], ['1', '2']);
        assert_eq!(noon.period, Period::Pm);
        let midnight = sample_at(Tz::UTC, utc(0, 0, 0));
        assert_eq!(midnight.digits[..2], ['1', '2']);
        assert_eq!(midnight.period, Period::Am);
    }

    #[test]
    fn sampling_respects_zone_offset() {
        // 13:05 UTC is 09:05 in New York during EDT.
        let at = Utc.with_ymd_and_hms(2026, 6, 1, 13, 5, 7).unwrap();
        let sample = sample_at(chrono_tz::America::New_York, at);
        assert_eq!(sample.digits, [BLANK, '9', '0', '5', '0', '7']);
    }

    #[test]
    fn invalid_zone_is_reported() {
        let sampler = TimeSampler::system();
        assert!(matches!(
            sampler.sample("Mars/Olympus_Mons"),
            Err(TockError::InvalidTimezone(_))
        ));
        assert!(sampler.sample("Europe/Paris").is_ok());
    }

    #[test]
    fn period_colors_follow_day_and_night() {
        assert_eq!(period_color_for_hour(24), period_color_for_hour(0));
        assert_eq!(period_color_for_hour(12), PERIOD_COLORS[12]);
        // Daytime tones are warm: red dominates blue.
        for hour in 6..18 {
            let Rgb(r, _, b) = period_color_for_hour(hour);
            assert!(r > b, "hour {hour}");
        }
        for hour in (18..24).chain(0..6) {
            let Rgb(r, _, b) = period_color_for_hour(hour);
            assert!(b > r, "hour {hour}");
        }
    }

    #[test]
    fn day_offset_only_when_weekday_differs() {
        // 2026-03-10 20:00 UTC is Tuesday in New York, Wednesday in Auckland.
        let at = utc(20, 0, 0);
        let ny = chrono_tz::America::New_York;
        assert_eq!(day_abbrev_at(ny, at), "TUE");
        assert_eq!(
            day_offset_at(chrono_tz::Pacific::Auckland, ny, at).as_deref(),
            Some("WED")
        );
        assert_eq!(day_offset_at(chrono_tz::America::Chicago, ny, at), None);
    }

    #[test]
    fn manual_source_advances() {
        let source = ManualTimeSource::new(utc(9, 5, 7));
        source.advance(chrono::Duration::seconds(1));
        assert_eq!(sample_at(Tz::UTC, source.now()).digits[5], '8');
    }
}
