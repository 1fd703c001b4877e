use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};

const SECONDS_PER_DAY: i64 = 86_400;

/// Unit a device reported its value in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    /// Raw counts per minute; needs a device sensitivity to become a dose rate.
    Cpm,
    /// Dose rate in µSv/h.
    #[serde(alias = "usv")]
    Microsievert,
}

impl Unit {
    pub fn is_dose_rate(self) -> bool {
        matches!(self, Unit::Microsievert)
    }

    pub fn label(self) -> &'static str {
        match self {
            Unit::Cpm => "cpm",
            Unit::Microsievert => "microsievert",
        }
    }
}

/// One row of the upstream measurement table, nulls included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: i64,
    pub user_id: i64,
    pub device_id: Option<i64>,
    pub unit: Unit,
    pub value: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub captured_at: Option<DateTime<Utc>>,
}

/// A measurement that passed every filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanMeasurement {
    pub id: i64,
    pub user_id: i64,
    pub device_id: Option<i64>,
    pub unit: Unit,
    pub value: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

impl CleanMeasurement {
    /// Whole days since the Unix epoch, rounded towards negative infinity.
    pub fn captured_day(&self) -> i64 {
        self.captured_at.timestamp().div_euclid(SECONDS_PER_DAY)
    }
}

/// Offset-carrying layouts beyond RFC 3339, e.g. `2013-01-01 09:00:00.5+09`.
const ZONED_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];
/// Layouts without an offset; taken as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses the timestamp shapes the upstream table is dumped with: RFC 3339,
/// or `YYYY-MM-DD HH:MM:SS` (space or `T` separated) with optional fractional
/// seconds and an optional `+HH`/`+HH:MM` offset. Without an offset the time
/// is UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Ok(stamp.with_timezone(&Utc));
    }
    for format in ZONED_FORMATS {
        if let Ok(stamp) = DateTime::parse_from_str(text, format) {
            return Ok(stamp.with_timezone(&Utc));
        }
    }
    NaiveDateTime::parse_from_str(text, NAIVE_FORMATS[0])
        .or_else(|_| NaiveDateTime::parse_from_str(text, NAIVE_FORMATS[1]))
        .map(|naive| naive.and_utc())
}

/// Unparseable timestamps read as null so the row is rejected by the filter
/// instead of failing the whole table.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => match parse_timestamp(text) {
            Ok(stamp) => Ok(Some(stamp)),
            Err(err) => {
                debug!("treating captured_at {text:?} as null: {err}");
                Ok(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339_and_bare_timestamps() {
        let expected = Utc.with_ymd_and_hms(2012, 5, 4, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2012-05-04T10:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2012-05-04T19:30:00+09:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2012-05-04 10:30:00").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn parses_database_dump_variants() {
        let midnight = Utc.with_ymd_and_hms(2013, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp("2013-01-01 00:00:00.25").unwrap(),
            midnight + chrono::Duration::milliseconds(250)
        );
        assert_eq!(parse_timestamp("2013-01-01 09:00:00+09").unwrap(), midnight);
        assert_eq!(parse_timestamp("2013-01-01 09:00:00+09:00").unwrap(), midnight);
        assert_eq!(
            parse_timestamp("2013-01-01 09:00:00.5+09").unwrap(),
            midnight + chrono::Duration::milliseconds(500)
        );
        assert_eq!(parse_timestamp("2013-01-01T00:00:00").unwrap(), midnight);
        assert_eq!(
            parse_timestamp("2013-01-01T00:00:00.125").unwrap(),
            midnight + chrono::Duration::milliseconds(125)
        );
        assert_eq!(parse_timestamp("2012-12-31T19:00:00-05").unwrap(), midnight);
    }

    #[test]
    fn captured_day_floors_pre_epoch_times() {
        let clean = CleanMeasurement {
            id: 1,
            user_id: 1,
            device_id: None,
            unit: Unit::Cpm,
            value: 40.0,
            latitude: 0.0,
            longitude: 1.0,
            captured_at: Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap(),
        };
        assert_eq!(clean.captured_day(), -1);

        let clean = CleanMeasurement {
            captured_at: Utc.with_ymd_and_hms(1970, 1, 2, 0, 0, 0).unwrap(),
            ..clean
        };
        assert_eq!(clean.captured_day(), 1);
    }

    #[test]
    fn csv_rows_deserialize_with_nulls() {
        let data = "\
id,user_id,device_id,unit,value,latitude,longitude,captured_at
7,12,,cpm,35.5,37.42,141.03,2013-01-01 00:00:00
8,12,21,usv,,37.42,141.03,
";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<Measurement> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].device_id, None);
        assert_eq!(rows[0].unit, Unit::Cpm);
        assert!(rows[0].captured_at.is_some());
        assert_eq!(rows[1].device_id, Some(21));
        assert_eq!(rows[1].unit, Unit::Microsievert);
        assert_eq!(rows[1].value, None);
        assert_eq!(rows[1].captured_at, None);
    }

    #[test]
    fn unparseable_timestamps_read_as_null() {
        let data = "\
id,user_id,device_id,unit,value,latitude,longitude,captured_at
7,12,,cpm,35.5,37.42,141.03,last tuesday
8,12,,cpm,35.5,37.42,141.03,2013-01-01 00:00:00.25
";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<Measurement> = reader
            .deserialize()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].captured_at, None);
        assert!(rows[1].captured_at.is_some());
    }
}
