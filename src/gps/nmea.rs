//! NMEA 0183 sentence parsing
//!
//! Sentence format: `$TTSSS,field,field,...*CS` where `TT` is the talker
//! (GP or GN), `SSS` the sentence type, and `CS` a two-digit hex XOR
//! checksum of everything between `$` and `*`.
//!
//! The parser is fail-open: anything unrecognized or malformed yields `None`
//! and the read loop moves on. Checksum verification is optional because the
//! field-count and numeric checks already reject most corrupted lines.

/// 1 knot in m/s
const KNOTS_TO_MS: f64 = 0.514444;

/// A recognized, decoded NMEA sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum Sentence {
    /// GGA — fix data: quality, satellites, HDOP, altitude, position
    Gga {
        latitude: f64,
        longitude: f64,
        fix_quality: u32,
        satellites: u32,
        hdop: f64,
        altitude: f64,
    },
    /// RMC — recommended minimum: position, speed, course (Active only)
    Rmc {
        latitude: Option<f64>,
        longitude: Option<f64>,
        speed: f64,
        course: f64,
    },
    /// GLL — geographic position (Active only)
    Gll {
        latitude: Option<f64>,
        longitude: Option<f64>,
    },
    /// VTG — track made good and ground speed
    Vtg { speed: f64 },
}

/// Verify the XOR checksum of a complete sentence.
///
/// Returns false when the `*` delimiter is absent.
pub fn verify_checksum(sentence: &str) -> bool {
    let Some(rest) = sentence.strip_prefix('$') else {
        return false;
    };
    let Some((data, checksum)) = rest.split_once('*') else {
        return false;
    };
    let computed = data.bytes().fold(0u8, |acc, b| acc ^ b);
    u8::from_str_radix(checksum.trim(), 16)
        .map(|expected| expected == computed)
        .unwrap_or(false)
}

/// Parse one line into a recognized sentence.
///
/// Lines without the `$` sentinel or the `*` checksum delimiter are dropped.
/// With `strict_checksum` set, sentences failing verification are dropped
/// too. Unknown sentence types and wrong field counts yield `None`.
pub fn parse_sentence(line: &str, strict_checksum: bool) -> Option<Sentence> {
    let line = line.trim();
    let rest = line.strip_prefix('$')?;
    let (data, _checksum) = rest.split_once('*')?;

    if strict_checksum && !verify_checksum(line) {
        return None;
    }

    let fields: Vec<&str> = data.split(',').collect();
    let command = fields.first()?;
    if command.len() != 5 {
        return None;
    }
    let (talker, kind) = command.split_at(2);
    if talker != "GP" && talker != "GN" {
        return None;
    }

    match kind {
        "GGA" => parse_gga(&fields),
        "RMC" => parse_rmc(&fields),
        "GLL" => parse_gll(&fields),
        "VTG" => parse_vtg(&fields),
        _ => None,
    }
}

/// Fix data. `$xxGGA,time,lat,N,lon,E,quality,sats,hdop,alt,M,geoid,M,age,station`
fn parse_gga(fields: &[&str]) -> Option<Sentence> {
    if fields.len() < 15 {
        return None;
    }

    let fix_quality = numeric_field(fields[6], 0u32)?;
    let satellites = numeric_field(fields[7], 0u32)?;
    let hdop = numeric_field(fields[8], 0.0f64)?;
    let altitude = numeric_field(fields[9], 0.0f64)?;

    let mut latitude = 0.0;
    let mut longitude = 0.0;
    if !fields[2].is_empty()
        && !fields[3].is_empty()
        && !fields[4].is_empty()
        && !fields[5].is_empty()
    {
        latitude = parse_coordinate(fields[2], fields[3], 2)?;
        longitude = parse_coordinate(fields[4], fields[5], 3)?;
    }

    Some(Sentence::Gga {
        latitude,
        longitude,
        fix_quality,
        satellites,
        hdop,
        altitude,
    })
}

/// Recommended minimum. `$xxRMC,time,status,lat,N,lon,E,speed_kn,course,date,...`
fn parse_rmc(fields: &[&str]) -> Option<Sentence> {
    if fields.len() < 12 {
        return None;
    }

    // V = void, position not trustworthy
    if fields[2] != "A" {
        return None;
    }

    let latitude = optional_coordinate(fields[3], fields[4], 2)?;
    let longitude = optional_coordinate(fields[5], fields[6], 3)?;
    let speed_knots = numeric_field(fields[7], 0.0f64)?;
    let course = numeric_field(fields[8], 0.0f64)?;

    Some(Sentence::Rmc {
        latitude,
        longitude,
        speed: speed_knots * KNOTS_TO_MS,
        course,
    })
}

/// Geographic position. `$xxGLL,lat,N,lon,E,time,status,mode`
fn parse_gll(fields: &[&str]) -> Option<Sentence> {
    if fields.len() < 7 {
        return None;
    }

    if fields[6] != "A" {
        return None;
    }

    let latitude = optional_coordinate(fields[1], fields[2], 2)?;
    let longitude = optional_coordinate(fields[3], fields[4], 3)?;

    Some(Sentence::Gll {
        latitude,
        longitude,
    })
}

/// Track and ground speed. `$xxVTG,course,T,course_m,M,speed_kn,N,speed_kmh,K,mode`
fn parse_vtg(fields: &[&str]) -> Option<Sentence> {
    if fields.len() < 10 {
        return None;
    }

    let speed_kmh = numeric_field(fields[7], 0.0f64)?;

    Some(Sentence::Vtg {
        speed: speed_kmh / 3.6,
    })
}

/// Empty fields take the default; present-but-unparsable fields drop the
/// whole sentence.
fn numeric_field<T: std::str::FromStr>(field: &str, default: T) -> Option<T> {
    if field.is_empty() {
        Some(default)
    } else {
        field.parse().ok()
    }
}

/// Decode a `DDMM.MMMM` / `DDDMM.MMMM` coordinate with its hemisphere letter.
fn parse_coordinate(raw: &str, hemisphere: &str, degree_digits: usize) -> Option<f64> {
    if raw.len() <= degree_digits {
        return None;
    }
    let degrees: f64 = raw.get(..degree_digits)?.parse().ok()?;
    let minutes: f64 = raw.get(degree_digits..)?.parse().ok()?;
    let mut value = degrees + minutes / 60.0;
    if hemisphere == "S" || hemisphere == "W" {
        value = -value;
    }
    Some(value)
}

/// As `parse_coordinate`, but an empty raw/hemisphere pair means "field not
/// present" (`Some(None)`) rather than a malformed sentence (`None`).
fn optional_coordinate(
    raw: &str,
    hemisphere: &str,
    degree_digits: usize,
) -> Option<Option<f64>> {
    if raw.is_empty() || hemisphere.is_empty() {
        return Some(None);
    }
    parse_coordinate(raw, hemisphere, degree_digits).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GGA_SAMPLE: &str =
        "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[test]
    fn test_gga_sample() {
        let sentence = parse_sentence(GGA_SAMPLE, false).expect("sample must parse");
        match sentence {
            Sentence::Gga {
                latitude,
                longitude,
                fix_quality,
                satellites,
                hdop,
                altitude,
            } => {
                assert!((latitude - 48.1173).abs() < 0.0001, "lat {latitude}");
                assert!((longitude - 11.5167).abs() < 0.0001, "lon {longitude}");
                assert_eq!(fix_quality, 1);
                assert_eq!(satellites, 8);
                assert_eq!(hdop, 0.9);
                assert_eq!(altitude, 545.4);
            }
            other => panic!("expected GGA, got {other:?}"),
        }
    }

    #[test]
    fn test_gga_checksum_is_valid() {
        assert!(verify_checksum(GGA_SAMPLE));
        assert!(parse_sentence(GGA_SAMPLE, true).is_some());
    }

    #[test]
    fn test_missing_checksum_delimiter_is_dropped() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,";
        assert!(parse_sentence(line, false).is_none());
        assert!(!verify_checksum(line));
    }

    #[test]
    fn test_bad_checksum_only_rejected_in_strict_mode() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00";
        assert!(parse_sentence(line, false).is_some());
        assert!(parse_sentence(line, true).is_none());
    }

    #[test]
    fn test_southern_western_hemispheres() {
        let line = "$GPGGA,123519,3352.000,S,15112.000,W,1,08,0.9,10.0,M,46.9,M,,*5A";
        let Some(Sentence::Gga {
            latitude,
            longitude,
            ..
        }) = parse_sentence(line, false)
        else {
            panic!("must parse");
        };
        assert!(latitude < 0.0);
        assert!(longitude < 0.0);
        assert!((latitude + 33.8667).abs() < 0.001);
        assert!((longitude + 151.2).abs() < 0.001);
    }

    #[test]
    fn test_rmc_active() {
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        let Some(Sentence::Rmc {
            latitude,
            longitude,
            speed,
            course,
        }) = parse_sentence(line, false)
        else {
            panic!("must parse");
        };
        assert!((latitude.unwrap() - 48.1173).abs() < 0.0001);
        assert!((longitude.unwrap() - 11.5167).abs() < 0.0001);
        // 22.4 knots -> m/s
        assert!((speed - 22.4 * 0.514444).abs() < 0.001);
        assert_eq!(course, 84.4);
    }

    #[test]
    fn test_rmc_void_is_dropped() {
        let line = "$GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*7D";
        assert!(parse_sentence(line, false).is_none());
    }

    #[test]
    fn test_gll_active() {
        let line = "$GNGLL,4807.038,N,01131.000,E,123519,A,A*40";
        let Some(Sentence::Gll {
            latitude,
            longitude,
        }) = parse_sentence(line, false)
        else {
            panic!("must parse");
        };
        assert!((latitude.unwrap() - 48.1173).abs() < 0.0001);
        assert!((longitude.unwrap() - 11.5167).abs() < 0.0001);
    }

    #[test]
    fn test_vtg_kmh_to_ms() {
        let line = "$GPVTG,054.7,T,034.4,M,005.5,N,010.2,K,A*25";
        let Some(Sentence::Vtg { speed }) = parse_sentence(line, false) else {
            panic!("must parse");
        };
        assert!((speed - 10.2 / 3.6).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_sentence_type_dropped() {
        assert!(parse_sentence("$GPGSV,3,1,11,03,03,111,00*74", false).is_none());
    }

    #[test]
    fn test_wrong_talker_dropped() {
        assert!(parse_sentence(
            "$GLGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47",
            false
        )
        .is_none());
    }

    #[test]
    fn test_short_field_count_dropped() {
        assert!(parse_sentence("$GPGGA,123519,4807.038,N*11", false).is_none());
    }

    #[test]
    fn test_non_numeric_field_dropped() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,abc,08,0.9,545.4,M,46.9,M,,*47";
        assert!(parse_sentence(line, false).is_none());
    }

    #[test]
    fn test_empty_numeric_fields_take_defaults() {
        let line = "$GPGGA,123519,,,,,0,,,,M,,M,,*56";
        let Some(Sentence::Gga {
            latitude,
            longitude,
            fix_quality,
            satellites,
            hdop,
            altitude,
        }) = parse_sentence(line, false)
        else {
            panic!("must parse");
        };
        assert_eq!(latitude, 0.0);
        assert_eq!(longitude, 0.0);
        assert_eq!(fix_quality, 0);
        assert_eq!(satellites, 0);
        assert_eq!(hdop, 0.0);
        assert_eq!(altitude, 0.0);
    }

    #[test]
    fn test_not_a_sentence() {
        assert!(parse_sentence("garbage", false).is_none());
        assert!(parse_sentence("", false).is_none());
    }
}
