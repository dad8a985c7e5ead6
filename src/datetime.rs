//! Date and time encoding.
//!
//! All eight calendar kinds share one component layout; each kind selects a
//! subset:
//!
//! - Year: signed integer, offset from the year 2000
//! - MonthDay: `month * 32 + day` as a 9-bit unsigned
//! - Time: `((hour * 64) + minute) * 64 + second` as a 17-bit unsigned
//! - FractionalSecs: presence boolean, then the fraction digits reversed as
//!   an unsigned integer (trailing zeros are not preserved)
//! - TimeZone: presence boolean, then `offsetMinutes + 840` as an 11-bit
//!   unsigned (range -14:00 to +14:00)

use crate::bitstream::{BitReader, BitWriter};
use crate::integer::{decode_nbit, decode_signed, encode_nbit, encode_signed};
use crate::{Error, Result};

const YEAR_OFFSET: i64 = 2000;
const TZ_OFFSET: i64 = 840;
const MONTH_DAY_BITS: u8 = 9;
const TIME_BITS: u8 = 17;
const TZ_BITS: u8 = 11;

/// The eight calendar kinds. The kind is carried by the datatype, never by
/// the stream itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    GYear,
    GYearMonth,
    Date,
    DateTime,
    GMonth,
    GMonthDay,
    GDay,
    Time,
}

impl DateTimeKind {
    fn has_year(self) -> bool {
        matches!(self, Self::GYear | Self::GYearMonth | Self::Date | Self::DateTime)
    }

    fn has_month_day(self) -> bool {
        !matches!(self, Self::GYear | Self::Time)
    }

    fn has_time(self) -> bool {
        matches!(self, Self::DateTime | Self::Time)
    }
}

/// A date/time value in its wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeValue {
    pub kind: DateTimeKind,
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Sekundenbruchteile, Ziffern umgekehrt (wie bei Decimal).
    pub fractional_rev: Option<u64>,
    /// Zeitzonen-Offset in Minuten, -840..=840.
    pub tz_minutes: Option<i16>,
}

impl DateTimeValue {
    /// Parses the XML Schema lexical form of the given kind.
    pub fn parse(lexical: &str, kind: DateTimeKind) -> Result<Self> {
        let s = lexical.trim();
        let mut v = Self {
            kind,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            fractional_rev: None,
            tz_minutes: None,
        };
        let invalid = || Error::InvalidValue(lexical.to_string());
        let (body, tz) = split_timezone(s);
        v.tz_minutes = match tz {
            Some(t) => Some(parse_timezone(t).ok_or_else(invalid)?),
            None => None,
        };

        let mut rest = body;
        if kind.has_year() {
            let (year, r) = parse_year(rest).ok_or_else(invalid)?;
            v.year = year;
            rest = r;
        }
        if kind.has_month_day() {
            let r = match kind {
                // gMonth "--MM", gMonthDay "--MM-DD", gDay "---DD"
                DateTimeKind::GMonth | DateTimeKind::GMonthDay => {
                    rest.strip_prefix("--").ok_or_else(invalid)?
                }
                DateTimeKind::GDay => rest.strip_prefix("---").ok_or_else(invalid)?,
                _ => rest.strip_prefix('-').ok_or_else(invalid)?,
            };
            if kind == DateTimeKind::GDay {
                let (day, r) = parse_two_digits(r).ok_or_else(invalid)?;
                v.day = day;
                rest = r;
            } else {
                let (month, r) = parse_two_digits(r).ok_or_else(invalid)?;
                v.month = month;
                rest = r;
                if kind != DateTimeKind::GYearMonth && kind != DateTimeKind::GMonth {
                    let r = rest.strip_prefix('-').ok_or_else(invalid)?;
                    let (day, r) = parse_two_digits(r).ok_or_else(invalid)?;
                    v.day = day;
                    rest = r;
                }
            }
            if v.month > 12 || v.day > 31 {
                return Err(invalid());
            }
        }
        if kind.has_time() {
            if kind == DateTimeKind::DateTime {
                rest = rest.strip_prefix('T').ok_or_else(invalid)?;
            }
            let (hour, r) = parse_two_digits(rest).ok_or_else(invalid)?;
            let r = r.strip_prefix(':').ok_or_else(invalid)?;
            let (minute, r) = parse_two_digits(r).ok_or_else(invalid)?;
            let r = r.strip_prefix(':').ok_or_else(invalid)?;
            let (second, r) = parse_two_digits(r).ok_or_else(invalid)?;
            v.hour = hour;
            v.minute = minute;
            v.second = second;
            if hour > 24 || minute > 59 || second > 60 {
                return Err(invalid());
            }
            rest = r;
            if let Some(frac) = rest.strip_prefix('.') {
                if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let mut rev = 0u64;
                for ch in frac.trim_end_matches('0').chars().rev() {
                    let d = u64::from(ch.to_digit(10).ok_or_else(invalid)?);
                    rev = rev
                        .checked_mul(10)
                        .and_then(|x| x.checked_add(d))
                        .ok_or(Error::IntegerOverflow)?;
                }
                if rev != 0 {
                    v.fractional_rev = Some(rev);
                }
                rest = "";
            }
        }
        if !rest.is_empty() {
            return Err(invalid());
        }
        Ok(v)
    }

    /// Renders the canonical lexical form.
    pub fn to_lexical(self) -> String {
        let mut s = String::new();
        if self.kind.has_year() {
            if self.year < 0 {
                s.push('-');
            }
            let y = self.year.unsigned_abs();
            if y < 10000 {
                s.push_str(&format!("{y:04}"));
            } else {
                s.push_str(&y.to_string());
            }
        }
        match self.kind {
            DateTimeKind::GMonth => s.push_str(&format!("--{:02}", self.month)),
            DateTimeKind::GMonthDay => {
                s.push_str(&format!("--{:02}-{:02}", self.month, self.day));
            }
            DateTimeKind::GDay => s.push_str(&format!("---{:02}", self.day)),
            DateTimeKind::GYearMonth => s.push_str(&format!("-{:02}", self.month)),
            DateTimeKind::Date | DateTimeKind::DateTime => {
                s.push_str(&format!("-{:02}-{:02}", self.month, self.day));
            }
            _ => {}
        }
        if self.kind.has_time() {
            if self.kind == DateTimeKind::DateTime {
                s.push('T');
            }
            s.push_str(&format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second));
            if let Some(rev) = self.fractional_rev {
                s.push('.');
                s.extend(rev.to_string().chars().rev());
            }
        }
        match self.tz_minutes {
            Some(0) => s.push('Z'),
            Some(tz) => {
                let sign = if tz < 0 { '-' } else { '+' };
                let m = tz.unsigned_abs();
                s.push_str(&format!("{sign}{:02}:{:02}", m / 60, m % 60));
            }
            None => {}
        }
        s
    }

    pub fn encode(self, writer: &mut BitWriter, byte_aligned: bool) {
        if self.kind.has_year() {
            encode_signed(writer, self.year - YEAR_OFFSET, byte_aligned);
        }
        if self.kind.has_month_day() {
            let md = u64::from(self.month) * 32 + u64::from(self.day);
            encode_nbit(writer, md, MONTH_DAY_BITS, byte_aligned);
        }
        if self.kind.has_time() {
            let t = (u64::from(self.hour) * 64 + u64::from(self.minute)) * 64
                + u64::from(self.second);
            encode_nbit(writer, t, TIME_BITS, byte_aligned);
            match self.fractional_rev {
                Some(rev) => {
                    crate::boolean::encode(writer, true, byte_aligned);
                    crate::integer::encode_unsigned(writer, rev);
                }
                None => crate::boolean::encode(writer, false, byte_aligned),
            }
        }
        match self.tz_minutes {
            Some(tz) => {
                crate::boolean::encode(writer, true, byte_aligned);
                encode_nbit(writer, (i64::from(tz) + TZ_OFFSET) as u64, TZ_BITS, byte_aligned);
            }
            None => crate::boolean::encode(writer, false, byte_aligned),
        }
    }

    pub fn decode(reader: &mut BitReader, kind: DateTimeKind, byte_aligned: bool) -> Result<Self> {
        let mut v = Self {
            kind,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            fractional_rev: None,
            tz_minutes: None,
        };
        if kind.has_year() {
            v.year = decode_signed(reader, byte_aligned)?
                .checked_add(YEAR_OFFSET)
                .ok_or(Error::IntegerOverflow)?;
        }
        if kind.has_month_day() {
            let md = decode_nbit(reader, MONTH_DAY_BITS, byte_aligned)?;
            v.month = (md / 32) as u8;
            v.day = (md % 32) as u8;
        }
        if kind.has_time() {
            let t = decode_nbit(reader, TIME_BITS, byte_aligned)?;
            v.second = (t % 64) as u8;
            v.minute = ((t / 64) % 64) as u8;
            v.hour = (t / 4096) as u8;
            if crate::boolean::decode(reader, byte_aligned)? {
                v.fractional_rev = Some(crate::integer::decode_unsigned(reader)?);
            }
        }
        if crate::boolean::decode(reader, byte_aligned)? {
            let raw = decode_nbit(reader, TZ_BITS, byte_aligned)?;
            let tz = raw as i64 - TZ_OFFSET;
            if !(-TZ_OFFSET..=TZ_OFFSET).contains(&tz) {
                return Err(Error::corrupt(
                    reader.bit_position(),
                    format!("time zone offset {tz} minutes out of range"),
                ));
            }
            v.tz_minutes = Some(tz as i16);
        }
        Ok(v)
    }
}

/// Trennt den Zeitzonen-Suffix ab ("Z", "+HH:MM", "-HH:MM").
fn split_timezone(s: &str) -> (&str, Option<&str>) {
    if let Some(body) = s.strip_suffix('Z') {
        return (body, Some("Z"));
    }
    // ±HH:MM sind genau 6 Zeichen; ein '-' weiter vorn ist Datums-Trenner
    if s.len() > 6 {
        let (body, tail) = s.split_at(s.len() - 6);
        if (tail.starts_with('+') || tail.starts_with('-')) && tail.as_bytes()[3] == b':' {
            return (body, Some(tail));
        }
    }
    (s, None)
}

fn parse_timezone(tz: &str) -> Option<i16> {
    if tz == "Z" {
        return Some(0);
    }
    let (sign, rest) = match tz.strip_prefix('-') {
        Some(r) => (-1i16, r),
        None => (1, tz.strip_prefix('+')?),
    };
    let (h, m) = rest.split_once(':')?;
    let h: i16 = h.parse().ok()?;
    let m: i16 = m.parse().ok()?;
    let total = sign * (h * 60 + m);
    (-840..=840).contains(&total).then_some(total)
}

/// Liest ein (ggf. negatives) Jahr mit mindestens vier Ziffern.
fn parse_year(s: &str) -> Option<(i64, &str)> {
    let (negative, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits < 4 {
        return None;
    }
    let year: i64 = rest[..digits].parse().ok()?;
    Some((if negative { -year } else { year }, &rest[digits..]))
}

fn parse_two_digits(s: &str) -> Option<(u8, &str)> {
    let d = s.get(..2)?;
    if !d.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((d.parse().ok()?, &s[2..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(lexical: &str, kind: DateTimeKind) -> String {
        let v = DateTimeValue::parse(lexical, kind).unwrap();
        let mut w = BitWriter::new();
        v.encode(&mut w, false);
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        let back = DateTimeValue::decode(&mut r, kind, false).unwrap();
        assert_eq!(back, v);
        back.to_lexical()
    }

    #[test]
    fn date_time_basic() {
        assert_eq!(
            round_trip("2026-08-30T14:05:09", DateTimeKind::DateTime),
            "2026-08-30T14:05:09"
        );
        assert_eq!(
            round_trip("1969-12-31T23:59:59Z", DateTimeKind::DateTime),
            "1969-12-31T23:59:59Z"
        );
    }

    #[test]
    fn alle_kalenderarten() {
        assert_eq!(round_trip("2026", DateTimeKind::GYear), "2026");
        assert_eq!(round_trip("2026-08", DateTimeKind::GYearMonth), "2026-08");
        assert_eq!(round_trip("2026-08-30", DateTimeKind::Date), "2026-08-30");
        assert_eq!(round_trip("--08", DateTimeKind::GMonth), "--08");
        assert_eq!(round_trip("--08-30", DateTimeKind::GMonthDay), "--08-30");
        assert_eq!(round_trip("---30", DateTimeKind::GDay), "---30");
        assert_eq!(round_trip("14:05:09", DateTimeKind::Time), "14:05:09");
    }

    /// Sekundenbruchteile: führende Nullen bleiben, nachlaufende fallen weg.
    #[test]
    fn fractional_seconds() {
        assert_eq!(
            round_trip("12:00:00.0123", DateTimeKind::Time),
            "12:00:00.0123"
        );
        // ".500" normalisiert zu ".5"
        assert_eq!(round_trip("12:00:00.500", DateTimeKind::Time), "12:00:00.5");
        // ".000" normalisiert zu keiner Fraktion
        assert_eq!(round_trip("12:00:00.000", DateTimeKind::Time), "12:00:00");
    }

    #[test]
    fn zeitzonen() {
        assert_eq!(round_trip("2026-08-30+02:00", DateTimeKind::Date), "2026-08-30+02:00");
        assert_eq!(round_trip("2026-08-30-05:30", DateTimeKind::Date), "2026-08-30-05:30");
        assert_eq!(round_trip("14:00:00Z", DateTimeKind::Time), "14:00:00Z");
        let v = DateTimeValue::parse("2026-08-30+14:00", DateTimeKind::Date).unwrap();
        assert_eq!(v.tz_minutes, Some(840));
    }

    #[test]
    fn negative_und_grosse_jahre() {
        assert_eq!(round_trip("-0044", DateTimeKind::GYear), "-0044");
        assert_eq!(round_trip("12345", DateTimeKind::GYear), "12345");
    }

    #[test]
    fn ungueltige_formen() {
        assert!(DateTimeValue::parse("2026-13-01", DateTimeKind::Date).is_err());
        assert!(DateTimeValue::parse("2026-08-32", DateTimeKind::Date).is_err());
        assert!(DateTimeValue::parse("25:00:00", DateTimeKind::Time).is_err());
        assert!(DateTimeValue::parse("123", DateTimeKind::GYear).is_err());
        assert!(DateTimeValue::parse("2026-08-30", DateTimeKind::DateTime).is_err());
        assert!(DateTimeValue::parse("12:00:00.", DateTimeKind::Time).is_err());
    }

    #[test]
    fn decode_rejects_bad_timezone() {
        let mut w = BitWriter::new();
        encode_signed(&mut w, 0, false); // Jahr 2000
        crate::boolean::encode(&mut w, true, false);
        encode_nbit(&mut w, 1750, TZ_BITS, false); // 1750 - 840 = 910 > 840
        let data = w.into_vec();
        let mut r = BitReader::new(&data);
        assert!(matches!(
            DateTimeValue::decode(&mut r, DateTimeKind::GYear, false).unwrap_err(),
            Error::CorruptStream { .. }
        ));
    }
}
