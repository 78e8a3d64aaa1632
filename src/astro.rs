use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::error::{MetabrokerError, Result};
use crate::types::Coordinates;

/// Unix epoch expressed as a Modified Julian Date.
pub const MJD_UNIX_EPOCH: f64 = 40_587.0;

/// Unix epoch expressed as a Julian Date.
pub const JD_UNIX_EPOCH: f64 = 2_440_587.5;

/// Convert a sexagesimal RA/Dec pair into decimal degrees.
///
/// Accepts colon or whitespace separated components and passes through values
/// that are already decimal. Out-of-range results are logged and returned
/// unchanged so callers can decide what to do with suspect positions.
pub fn parse_coordinates(ra: &str, dec: &str) -> Result<Coordinates> {
    let ra = parse_ra(ra)?;
    let dec = parse_dec(dec)?;
    if !(0.0..360.0).contains(&ra) {
        warn!(ra, "right ascension outside [0, 360)");
    }
    if !(-90.0..=90.0).contains(&dec) {
        warn!(dec, "declination outside [-90, 90]");
    }
    Ok(Coordinates { ra, dec })
}

/// Right ascension in hours:minutes:seconds to decimal degrees.
pub fn parse_ra(value: &str) -> Result<f64> {
    let value = value.trim();
    if let Some(decimal) = parse_decimal(value) {
        return Ok(decimal);
    }
    let parts = split_components(value)?;
    let hours = parts[0];
    let minutes = parts[1];
    let seconds = parts.get(2).copied().unwrap_or(0.0);
    Ok(hours * 15.0 + minutes * 15.0 / 60.0 + seconds * 15.0 / 3600.0)
}

/// Declination in degrees:arcminutes:arcseconds to decimal degrees.
///
/// The sign is captured before splitting so that "-00:30:00" keeps its
/// negative half degree.
pub fn parse_dec(value: &str) -> Result<f64> {
    let value = value.trim();
    if let Some(decimal) = parse_decimal(value) {
        return Ok(decimal);
    }
    let negative = value.starts_with('-');
    let unsigned = value.trim_start_matches(['+', '-']);
    let parts = split_components(unsigned)?;
    let degrees = parts[0];
    let minutes = parts[1];
    let seconds = parts.get(2).copied().unwrap_or(0.0);
    let magnitude = degrees + minutes / 60.0 + seconds / 3600.0;
    Ok(if negative { -magnitude } else { magnitude })
}

fn parse_decimal(value: &str) -> Option<f64> {
    if value.contains([':', ' ', '\t']) {
        return None;
    }
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn split_components(value: &str) -> Result<Vec<f64>> {
    let parts: Vec<f64> = value
        .split([':', ' ', '\t'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<f64>().map_err(|_| {
                MetabrokerError::ParseError(format!("non-numeric coordinate component: {part:?}"))
            })
        })
        .collect::<Result<_>>()?;
    if !(2..=3).contains(&parts.len()) {
        return Err(MetabrokerError::ParseError(format!(
            "unrecognized coordinate format: {value:?}"
        )));
    }
    Ok(parts)
}

/// Calendar date (UTC) of an instant on the Modified Julian Date scale.
pub fn mjd_to_date(mjd: f64) -> Option<NaiveDate> {
    date_of_unix_seconds((mjd - MJD_UNIX_EPOCH) * 86_400.0)
}

/// Calendar date (UTC) of an instant on the Julian Date scale.
pub fn jd_to_date(jd: f64) -> Option<NaiveDate> {
    date_of_unix_seconds((jd - JD_UNIX_EPOCH) * 86_400.0)
}

fn date_of_unix_seconds(seconds: f64) -> Option<NaiveDate> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp(seconds.floor() as i64, 0).map(|dt| dt.date_naive())
}

/// Modified Julian Date of a calendar day at midnight UTC.
pub fn date_to_mjd(date: NaiveDate) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17).unwrap();
    (date - epoch).num_days()
}

/// Round to a fixed number of decimal places for display payloads.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sexagesimal_pair_converts_to_decimal_degrees() {
        let coords = parse_coordinates("14:03:05.810", "+54:16:25.39").unwrap();
        assert!((coords.ra - 210.774_208).abs() < 1e-3);
        assert!((coords.dec - 54.273_719).abs() < 1e-3);
    }

    #[test]
    fn negative_declination_keeps_sign_for_zero_degrees() {
        let dec = parse_dec("-00:30:00").unwrap();
        assert!((dec + 0.5).abs() < 1e-9);
    }

    #[test]
    fn decimal_inputs_pass_through() {
        assert_eq!(parse_ra("210.77421").unwrap(), 210.77421);
        assert_eq!(parse_dec("-1.25").unwrap(), -1.25);
    }

    #[test]
    fn whitespace_separated_components_are_accepted() {
        let ra = parse_ra("14 03 05.810").unwrap();
        assert!((ra - 210.774_208).abs() < 1e-3);
    }

    #[test]
    fn out_of_range_values_are_returned_unchanged() {
        let coords = parse_coordinates("25:00:00", "+95:00:00").unwrap();
        assert!((coords.ra - 375.0).abs() < 1e-9);
        assert!((coords.dec - 95.0).abs() < 1e-9);
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(parse_ra("one four three").is_err());
        assert!(parse_dec("").is_err());
        assert!(parse_ra("14:").is_err());
    }

    #[test]
    fn epoch_conversions_match_known_date() {
        let expected = NaiveDate::from_ymd_opt(2020, 5, 31);
        assert_eq!(mjd_to_date(59_000.0), expected);
        assert_eq!(jd_to_date(2_459_000.5), expected);
    }

    #[test]
    fn mjd_round_trips_through_calendar_dates() {
        let date = NaiveDate::from_ymd_opt(2020, 5, 31).unwrap();
        assert_eq!(date_to_mjd(date), 59_000);
        assert_eq!(mjd_to_date(59_000.0), Some(date));
    }

    #[test]
    fn rounding_is_fixed_precision() {
        assert_eq!(round_to(210.774_208_333, 6), 210.774_208);
        assert_eq!(round_to(17.456, 2), 17.46);
        assert_eq!(round_to(0.85 * 100.0, 1), 85.0);
    }
}
