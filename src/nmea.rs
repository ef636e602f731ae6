use heapless::Vec;
use log::debug;

use crate::constants::NMEA_LINE_MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Latest state reported by the receiver.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Fix {
    pub valid: bool,
    // Decimal degrees, north and east positive
    pub latitude: f64,
    pub longitude: f64,
    pub satellites: u8,
    pub date: Option<UtcDate>,
    pub time: Option<UtcTime>,
}

impl Fix {
    /// Epoch seconds of the fix date and time, shifted by `utc_offset_hours`.
    pub fn timestamp(&self, utc_offset_hours: i8) -> Option<i64> {
        let (date, time) = (self.date?, self.time?);
        let utc = chrono::NaiveDate::from_ymd_opt(
            i32::from(date.year),
            u32::from(date.month),
            u32::from(date.day),
        )?
        .and_hms_opt(
            u32::from(time.hour),
            u32::from(time.minute),
            u32::from(time.second),
        )?
        .and_utc()
        .timestamp();

        Some(utc + i64::from(utc_offset_hours) * 3600)
    }
}

/// Sentence kinds that update the fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentence {
    Rmc,
    Gga,
}

/// Byte-at-a-time NMEA 0183 reader for RMC and GGA sentences.
///
/// Sentences with a bad or missing checksum, unknown types and overlong lines
/// are dropped without touching the fix.
#[derive(Debug, Default)]
pub struct NmeaParser {
    line: Vec<u8, NMEA_LINE_MAX>,
    overflow: bool,
    fix: Fix,
}

impl NmeaParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fix(&self) -> &Fix {
        &self.fix
    }

    /// Feeds one byte, returning the sentence kind when a line completed and updated the fix.
    pub fn feed(&mut self, byte: u8) -> Option<Sentence> {
        match byte {
            b'$' => {
                self.line.clear();
                self.overflow = false;
                let _ = self.line.push(byte);
                None
            }
            b'\r' => None,
            b'\n' => {
                let complete = !self.overflow && self.line.first() == Some(&b'$');
                let sentence = if complete {
                    self.parse_line()
                } else {
                    None
                };
                self.line.clear();
                self.overflow = false;
                sentence
            }
            _ => {
                if self.line.push(byte).is_err() {
                    self.overflow = true;
                }
                None
            }
        }
    }

    fn parse_line(&mut self) -> Option<Sentence> {
        let line = core::str::from_utf8(&self.line).ok()?;
        let body = checked_body(line)?;

        let mut fields = body.split(',');
        let address = fields.next()?;
        if address.len() < 5 {
            return None;
        }

        match address.get(address.len() - 3..)? {
            "RMC" => parse_rmc(&mut self.fix, fields),
            "GGA" => parse_gga(&mut self.fix, fields),
            other => {
                debug!("Ignoring NMEA sentence {}", other);
                None
            }
        }
    }
}

/// Text between `$` and `*` when the trailing checksum matches.
fn checked_body(line: &str) -> Option<&str> {
    let (body, checksum) = line.strip_prefix('$')?.split_once('*')?;
    let expected = u8::from_str_radix(checksum.get(..2)?, 16).ok()?;
    let actual = body.bytes().fold(0u8, |acc, b| acc ^ b);

    if actual != expected {
        debug!("NMEA checksum mismatch: {:02X} != {:02X}", actual, expected);
        return None;
    }
    Some(body)
}

fn parse_rmc<'a>(fix: &mut Fix, mut fields: impl Iterator<Item = &'a str>) -> Option<Sentence> {
    let time = fields.next()?;
    let status = fields.next()?;
    let latitude = (fields.next()?, fields.next()?);
    let longitude = (fields.next()?, fields.next()?);
    let _speed = fields.next()?;
    let _course = fields.next()?;
    let date = fields.next()?;

    if let Some(time) = parse_time(time) {
        fix.time = Some(time);
    }
    if let Some(date) = parse_date(date) {
        fix.date = Some(date);
    }

    fix.valid = status == "A";
    if fix.valid {
        update_position(fix, latitude, longitude);
    }

    Some(Sentence::Rmc)
}

fn parse_gga<'a>(fix: &mut Fix, mut fields: impl Iterator<Item = &'a str>) -> Option<Sentence> {
    let time = fields.next()?;
    let latitude = (fields.next()?, fields.next()?);
    let longitude = (fields.next()?, fields.next()?);
    let quality = fields.next()?;
    let satellites = fields.next()?;

    if let Some(time) = parse_time(time) {
        fix.time = Some(time);
    }
    fix.satellites = satellites.parse().unwrap_or(0);

    fix.valid = !matches!(quality, "" | "0");
    if fix.valid {
        update_position(fix, latitude, longitude);
    }

    Some(Sentence::Gga)
}

fn update_position(fix: &mut Fix, latitude: (&str, &str), longitude: (&str, &str)) {
    match (
        parse_coordinate(latitude.0, latitude.1, 2),
        parse_coordinate(longitude.0, longitude.1, 3),
    ) {
        (Some(lat), Some(lon)) => {
            fix.latitude = lat;
            fix.longitude = lon;
        }
        _ => fix.valid = false,
    }
}

/// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into signed decimal degrees.
fn parse_coordinate(value: &str, hemisphere: &str, degree_digits: usize) -> Option<f64> {
    let degrees: f64 = value.get(..degree_digits)?.parse().ok()?;
    let minutes: f64 = value.get(degree_digits..)?.parse().ok()?;
    let magnitude = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Some(magnitude),
        "S" | "W" => Some(-magnitude),
        _ => None,
    }
}

fn two_digits(text: &str, at: usize) -> Option<u8> {
    text.get(at..at + 2)?.parse().ok()
}

fn parse_time(text: &str) -> Option<UtcTime> {
    let time = UtcTime {
        hour: two_digits(text, 0)?,
        minute: two_digits(text, 2)?,
        second: two_digits(text, 4)?,
    };
    (time.hour < 24 && time.minute < 60 && time.second < 61).then_some(time)
}

fn parse_date(text: &str) -> Option<UtcDate> {
    Some(UtcDate {
        day: two_digits(text, 0)?,
        month: two_digits(text, 2)?,
        year: 2000 + u16::from(two_digits(text, 4)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RMC: &str = "$GPRMC,183015.00,A,1901.0972,N,09814.5252,W,0.12,,150924,,,A*55\r\n";
    const GGA: &str =
        "$GNGGA,183015.00,1901.0972,N,09814.5252,W,1,09,0.95,2150.3,M,-8.1,M,,*7B\r\n";
    const RMC_NO_FIX: &str = "$GPRMC,183020.00,V,,,,,,,150924,,,N*7E\r\n";
    const GGA_NO_FIX: &str = "$GPGGA,183020.00,,,,,0,00,99.99,,,,,,*6E\r\n";

    fn feed_all(parser: &mut NmeaParser, text: &str) -> std::vec::Vec<Sentence> {
        text.bytes().filter_map(|b| parser.feed(b)).collect()
    }

    #[test]
    fn rmc_gives_position_date_and_time() {
        let mut parser = NmeaParser::new();

        assert_eq!(feed_all(&mut parser, RMC), [Sentence::Rmc]);

        let fix = parser.fix();
        assert!(fix.valid);
        assert!((fix.latitude - 19.018286667).abs() < 1e-8);
        assert!((fix.longitude + 98.242086667).abs() < 1e-8);
        assert_eq!(
            fix.date,
            Some(UtcDate {
                year: 2024,
                month: 9,
                day: 15
            })
        );
        assert_eq!(
            fix.time,
            Some(UtcTime {
                hour: 18,
                minute: 30,
                second: 15
            })
        );
    }

    #[test]
    fn gga_gives_satellites() {
        let mut parser = NmeaParser::new();

        assert_eq!(feed_all(&mut parser, GGA), [Sentence::Gga]);
        assert!(parser.fix().valid);
        assert_eq!(parser.fix().satellites, 9);
    }

    #[test]
    fn lost_fix_keeps_last_position() {
        let mut parser = NmeaParser::new();
        feed_all(&mut parser, RMC);

        feed_all(&mut parser, RMC_NO_FIX);
        assert!(!parser.fix().valid);
        assert!((parser.fix().latitude - 19.018286667).abs() < 1e-8);

        feed_all(&mut parser, GGA_NO_FIX);
        assert!(!parser.fix().valid);
        assert_eq!(parser.fix().satellites, 0);
    }

    #[test]
    fn bad_checksum_is_ignored() {
        let mut parser = NmeaParser::new();
        let corrupted = RMC.replace("*55", "*56");

        assert!(feed_all(&mut parser, &corrupted).is_empty());
        assert_eq!(parser.fix(), &Fix::default());
    }

    #[test]
    fn garbage_and_other_sentences_are_skipped() {
        let mut parser = NmeaParser::new();
        let mut stream = std::string::String::from("\x00\x7fnoise");
        stream.push_str("$GPGSV,1,1,00*79\r\n");
        stream.push_str(&"9".repeat(NMEA_LINE_MAX * 2));
        stream.push_str(GGA);

        assert_eq!(feed_all(&mut parser, &stream), [Sentence::Gga]);
    }

    #[test]
    fn overlong_line_is_dropped() {
        let mut parser = NmeaParser::new();
        let mut line = std::string::String::from("$GPRMC,");
        line.push_str(&",".repeat(NMEA_LINE_MAX));
        line.push_str("*00\r\n");

        assert!(feed_all(&mut parser, &line).is_empty());
    }

    #[test]
    fn timestamp_applies_utc_offset() {
        let mut parser = NmeaParser::new();
        feed_all(&mut parser, RMC);

        assert_eq!(parser.fix().timestamp(0), Some(1_726_425_015));
        assert_eq!(parser.fix().timestamp(-6), Some(1_726_425_015 - 6 * 3600));
    }

    #[test]
    fn no_timestamp_without_date() {
        let mut parser = NmeaParser::new();
        feed_all(&mut parser, GGA);

        assert!(parser.fix().time.is_some());
        assert_eq!(parser.fix().timestamp(-6), None);
    }

    #[test]
    fn new_years_eve() {
        let mut parser = NmeaParser::new();
        feed_all(
            &mut parser,
            "$GPRMC,235959,A,1901.0972,N,09814.5252,W,0.0,0.0,311224,,,A*65\r\n",
        );

        assert_eq!(parser.fix().timestamp(0), Some(1_735_689_599));
    }
}
