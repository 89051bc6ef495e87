//! Core value types shared by schema, rows and checks.
//!
//! Raw cells coming out of a parser are [`Cell`]s (a JSON value, so that typed sources such
//! as JSON or Excel keep their native numbers and booleans). Casting a cell through a
//! [`crate::schema::Field`] yields a typed [`Value`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A raw cell as produced by a parser.
pub type Cell = serde_json::Value;

/// Stringify a raw cell for diagnostics and header labels.
///
/// Strings are returned verbatim, `null` becomes the empty string, everything else is
/// rendered as compact JSON.
pub fn cell_to_string(cell: &Cell) -> String {
    match cell {
        Cell::Null => String::new(),
        Cell::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Closed set of logical field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Any,
    Array,
    Boolean,
    Date,
    Datetime,
    Duration,
    Geojson,
    Geopoint,
    Integer,
    Number,
    Object,
    String,
    Time,
    Year,
    Yearmonth,
}

impl FieldType {
    /// Candidate order used by schema inference, most specific first.
    pub const INFERENCE_ORDER: [FieldType; 15] = [
        FieldType::Yearmonth,
        FieldType::Duration,
        FieldType::Geojson,
        FieldType::Geopoint,
        FieldType::Object,
        FieldType::Array,
        FieldType::Datetime,
        FieldType::Time,
        FieldType::Date,
        FieldType::Integer,
        FieldType::Number,
        FieldType::Boolean,
        FieldType::Year,
        FieldType::String,
        FieldType::Any,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Array => "array",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Duration => "duration",
            Self::Geojson => "geojson",
            Self::Geopoint => "geopoint",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Object => "object",
            Self::String => "string",
            Self::Time => "time",
            Self::Year => "year",
            Self::Yearmonth => "yearmonth",
        }
    }

    /// Whether `minimum`/`maximum` apply to this type.
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            Self::Integer
                | Self::Number
                | Self::Date
                | Self::Datetime
                | Self::Time
                | Self::Year
                | Self::Yearmonth
        )
    }

    /// Whether `minLength`/`maxLength` apply to this type.
    pub fn is_sized(self) -> bool {
        matches!(self, Self::String | Self::Array | Self::Object)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::INFERENCE_ORDER
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown field type \"{s}\""))
    }
}

/// ISO 8601 duration (`PnYnMnDTnHnMnS`).
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoDuration {
    pub years: u64,
    pub months: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: f64,
}

impl IsoDuration {
    fn key(&self) -> (u64, u64, u64, u64, u64, u64) {
        (
            self.years,
            self.months,
            self.days,
            self.hours,
            self.minutes,
            self.seconds.to_bits(),
        )
    }
}

impl PartialEq for IsoDuration {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for IsoDuration {}

impl Hash for IsoDuration {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl FromStr for IsoDuration {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix('P')
            .ok_or_else(|| "duration must start with \"P\"".to_string())?;
        if body.is_empty() {
            return Err("duration has no components".to_string());
        }
        let (date_part, time_part) = match body.split_once('T') {
            Some((d, t)) if t.is_empty() => return Err(format!("empty time part in \"{d}T\"")),
            Some((d, t)) => (d, Some(t)),
            None => (body, None),
        };

        let mut out = IsoDuration::default();
        let mut seen = false;
        for (number, unit) in components(date_part)? {
            let n = parse_whole(&number)?;
            match unit {
                'Y' => out.years = n,
                'M' => out.months = n,
                'W' => out.days += n * 7,
                'D' => out.days += n,
                other => return Err(format!("unexpected date designator '{other}'")),
            }
            seen = true;
        }
        if let Some(time_part) = time_part {
            for (number, unit) in components(time_part)? {
                match unit {
                    'H' => out.hours = parse_whole(&number)?,
                    'M' => out.minutes = parse_whole(&number)?,
                    'S' => {
                        out.seconds = number
                            .parse::<f64>()
                            .map_err(|_| format!("invalid seconds \"{number}\""))?
                    }
                    other => return Err(format!("unexpected time designator '{other}'")),
                }
                seen = true;
            }
        }
        if !seen {
            return Err("duration has no components".to_string());
        }
        Ok(out)
    }
}

fn components(part: &str) -> Result<Vec<(String, char)>, String> {
    let mut out = Vec::new();
    let mut number = String::new();
    for ch in part.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            number.push(ch);
        } else if ch.is_ascii_uppercase() {
            if number.is_empty() {
                return Err(format!("designator '{ch}' without a number"));
            }
            out.push((std::mem::take(&mut number), ch));
        } else {
            return Err(format!("unexpected character '{ch}'"));
        }
    }
    if !number.is_empty() {
        return Err(format!("number \"{number}\" without a designator"));
    }
    Ok(out)
}

fn parse_whole(number: &str) -> Result<u64, String> {
    number
        .parse::<u64>()
        .map_err(|_| format!("invalid duration component \"{number}\""))
}

impl fmt::Display for IsoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("P")?;
        if self.years > 0 {
            write!(f, "{}Y", self.years)?;
        }
        if self.months > 0 {
            write!(f, "{}M", self.months)?;
        }
        if self.days > 0 {
            write!(f, "{}D", self.days)?;
        }
        let has_time = self.hours > 0 || self.minutes > 0 || self.seconds > 0.0;
        let empty = self.years == 0 && self.months == 0 && self.days == 0 && !has_time;
        if has_time || empty {
            f.write_str("T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0.0 || empty {
                write!(f, "{}S", self.seconds)?;
            }
        }
        Ok(())
    }
}

/// A geographic point as longitude/latitude.
#[derive(Debug, Clone, Copy)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl PartialEq for GeoPoint {
    fn eq(&self, other: &Self) -> bool {
        self.lon.to_bits() == other.lon.to_bits() && self.lat.to_bits() == other.lat.to_bits()
    }
}

impl Eq for GeoPoint {}

impl Hash for GeoPoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lon.to_bits().hash(state);
        self.lat.to_bits().hash(state);
    }
}

/// A `number` value together with the text it was read from.
///
/// Equality, hashing and ordering use the numeric value only, so `"1.50"` and `"1.5"`
/// collide in unique and primary-key checks. Writing gives back the source text.
#[derive(Debug, Clone)]
pub struct Decimal {
    value: f64,
    text: Option<String>,
}

impl Decimal {
    pub fn new(value: f64) -> Self {
        Self { value, text: None }
    }

    pub fn parsed(value: f64, text: impl Into<String>) -> Self {
        Self {
            value,
            text: Some(text.into()),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Source text, when the value came from a string cell.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

impl From<f64> for Decimal {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.value.to_bits() == other.value.to_bits()
    }
}

impl Eq for Decimal {}

impl Hash for Decimal {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.to_bits().hash(state);
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// How a zoned datetime spelled its offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Written as `Z`.
    Utc,
    Fixed(FixedOffset),
}

impl Zone {
    pub fn offset(&self) -> FixedOffset {
        match self {
            Zone::Utc => Utc.fix(),
            Zone::Fixed(offset) => *offset,
        }
    }
}

/// A `datetime` value: wall-clock time plus the offset it was written with, if any.
///
/// Two timestamps are equal when they denote the same instant; a naive timestamp is
/// taken as UTC for that purpose.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    pub local: NaiveDateTime,
    pub zone: Option<Zone>,
    /// Fraction digits to write; `None` picks 3, 6 or 9 from the nanoseconds.
    pub fraction: Option<u8>,
}

impl Timestamp {
    pub fn naive(local: NaiveDateTime) -> Self {
        Self {
            local,
            zone: None,
            fraction: None,
        }
    }

    pub fn zoned(dt: DateTime<FixedOffset>, utc: bool) -> Self {
        let zone = if utc && dt.offset().local_minus_utc() == 0 {
            Zone::Utc
        } else {
            Zone::Fixed(*dt.offset())
        };
        Self {
            local: dt.naive_local(),
            zone: Some(zone),
            fraction: None,
        }
    }

    pub fn with_fraction(mut self, digits: Option<u8>) -> Self {
        self.fraction = digits.map(|d| d.min(9));
        self
    }

    /// The instant in UTC.
    pub fn instant(&self) -> NaiveDateTime {
        match self.zone {
            None => self.local,
            Some(zone) => {
                let shift = TimeDelta::seconds(i64::from(zone.offset().local_minus_utc()));
                self.local.checked_sub_signed(shift).unwrap_or(self.local)
            }
        }
    }

    /// Format with a strftime pattern; offset directives need a zoned value.
    pub fn format_with(&self, pattern: &str) -> Option<String> {
        use std::fmt::Write as _;
        let mut out = String::new();
        match self.zone {
            Some(zone) => {
                let dt = DateTime::<FixedOffset>::from_naive_utc_and_offset(self.instant(), zone.offset());
                write!(out, "{}", dt.format(pattern)).ok()?;
            }
            None => write!(out, "{}", self.local.format(pattern)).ok()?,
        }
        Some(out)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.instant() == other.instant()
    }
}

impl Eq for Timestamp {}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instant().hash(state);
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant().cmp(&other.instant())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local.format("%Y-%m-%dT%H:%M:%S"))?;
        let nanos = self.local.nanosecond();
        match self.fraction {
            Some(0) => {}
            Some(digits) => {
                let all = format!("{nanos:09}");
                write!(f, ".{}", &all[..usize::from(digits)])?;
            }
            None if nanos != 0 => write!(f, "{}", self.local.format("%.f"))?,
            None => {}
        }
        match self.zone {
            None => Ok(()),
            Some(Zone::Utc) => f.write_str("Z"),
            Some(Zone::Fixed(offset)) => {
                let secs = offset.local_minus_utc();
                let sign = if secs < 0 { '-' } else { '+' };
                let secs = secs.unsigned_abs();
                write!(f, "{sign}{:02}:{:02}", secs / 3600, secs / 60 % 60)
            }
        }
    }
}

/// A typed cell value produced by [`crate::schema::Field::read_cell`].
#[derive(Debug, Clone)]
pub enum Value {
    /// Missing value or failed cast.
    Null,
    /// Untyped value kept as the raw cell.
    Any(Cell),
    Array(Vec<Cell>),
    Boolean(bool),
    Date(NaiveDate),
    Datetime(Timestamp),
    Duration(IsoDuration),
    Geojson(serde_json::Map<String, Cell>),
    Geopoint(GeoPoint),
    Integer(i64),
    Number(Decimal),
    Object(serde_json::Map<String, Cell>),
    String(String),
    Time(NaiveTime),
    Year(i32),
    Yearmonth { year: i32, month: u32 },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view used by statistical checks.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Number(v) => Some(v.value()),
            Value::Year(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Length used by `minLength`/`maxLength` (characters, items or keys).
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(items) => Some(items.len()),
            Value::Object(map) => Some(map.len()),
            _ => None,
        }
    }

    /// JSON rendering used by reports, exports and expression evaluation.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null => J::Null,
            Value::Any(cell) => cell.clone(),
            Value::Array(items) => J::Array(items.clone()),
            Value::Boolean(b) => J::Bool(*b),
            Value::Integer(i) => J::from(*i),
            Value::Number(n) => serde_json::Number::from_f64(n.value())
                .map(J::Number)
                .unwrap_or_else(|| J::String(n.to_string())),
            Value::Object(map) | Value::Geojson(map) => J::Object(map.clone()),
            Value::Geopoint(p) => J::Array(vec![J::from(p.lon), J::from(p.lat)]),
            Value::Year(y) => J::from(*y),
            other => J::String(other.to_string()),
        }
    }

    fn discriminant(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Any(_) => 1,
            Value::Array(_) => 2,
            Value::Boolean(_) => 3,
            Value::Date(_) => 4,
            Value::Datetime(_) => 5,
            Value::Duration(_) => 6,
            Value::Geojson(_) => 7,
            Value::Geopoint(_) => 8,
            Value::Integer(_) => 9,
            Value::Number(_) => 10,
            Value::Object(_) => 11,
            Value::String(_) => 12,
            Value::Time(_) => 13,
            Value::Year(_) => 14,
            Value::Yearmonth { .. } => 15,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Any(a), Value::Any(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Datetime(a), Value::Datetime(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Geojson(a), Value::Geojson(b)) => a == b,
            (Value::Geopoint(a), Value::Geopoint(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Year(a), Value::Year(b)) => a == b,
            (
                Value::Yearmonth { year: y1, month: m1 },
                Value::Yearmonth { year: y2, month: m2 },
            ) => y1 == y2 && m1 == m2,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.discriminant().hash(state);
        match self {
            Value::Null => {}
            Value::Any(cell) => cell.to_string().hash(state),
            Value::Array(items) => serde_json::Value::Array(items.clone()).to_string().hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Datetime(d) => d.hash(state),
            Value::Duration(d) => d.hash(state),
            Value::Geojson(m) | Value::Object(m) => {
                serde_json::Value::Object(m.clone()).to_string().hash(state)
            }
            Value::Geopoint(p) => p.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Number(n) => n.hash(state),
            Value::String(s) => s.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Year(y) => y.hash(state),
            Value::Yearmonth { year, month } => (year, month).hash(state),
        }
    }
}

impl PartialOrd for Value {
    /// Values are only ordered within the same variant (`Integer`/`Number` compare
    /// numerically across each other).
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(_), Value::Number(_)) | (Value::Number(_), Value::Integer(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::Number(a), Value::Number(b)) => a.value().partial_cmp(&b.value()),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Datetime(a), Value::Datetime(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            (Value::Year(a), Value::Year(b)) => Some(a.cmp(b)),
            (
                Value::Yearmonth { year: y1, month: m1 },
                Value::Yearmonth { year: y2, month: m2 },
            ) => Some((y1, m1).cmp(&(y2, m2))),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Any(cell) => f.write_str(&cell_to_string(cell)),
            Value::Array(items) => write!(f, "{}", serde_json::Value::Array(items.clone())),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Datetime(d) => write!(f, "{d}"),
            Value::Duration(d) => write!(f, "{d}"),
            Value::Geojson(m) | Value::Object(m) => {
                write!(f, "{}", serde_json::Value::Object(m.clone()))
            }
            Value::Geopoint(p) => write!(f, "{}, {}", p.lon, p.lat),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Value::Year(y) => write!(f, "{y}"),
            Value::Yearmonth { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_parses_and_displays() {
        assert_eq!("yearmonth".parse::<FieldType>().unwrap(), FieldType::Yearmonth);
        assert_eq!(FieldType::Geopoint.to_string(), "geopoint");
        assert!("decimal".parse::<FieldType>().is_err());
        let t: FieldType = serde_json::from_str("\"datetime\"").unwrap();
        assert_eq!(t, FieldType::Datetime);
    }

    #[test]
    fn duration_parses_iso_forms() {
        let d: IsoDuration = "P1Y2M10DT2H30M".parse().unwrap();
        assert_eq!((d.years, d.months, d.days, d.hours, d.minutes), (1, 2, 10, 2, 30));
        assert_eq!(d.to_string(), "P1Y2M10DT2H30M");

        let d: IsoDuration = "PT0.5S".parse().unwrap();
        assert_eq!(d.seconds, 0.5);
        assert_eq!(d.to_string(), "PT0.5S");

        assert!("P".parse::<IsoDuration>().is_err());
        assert!("1Y".parse::<IsoDuration>().is_err());
        assert!("P1YT".parse::<IsoDuration>().is_err());
    }

    #[test]
    fn numbers_compare_across_integer_and_number() {
        assert!(Value::Integer(2) > Value::Number(1.5.into()));
        assert_eq!(Value::Integer(1).partial_cmp(&Value::String("1".into())), None);
        assert_eq!(Value::Number(f64::NAN.into()), Value::Number(f64::NAN.into()));
        assert_eq!(Value::Number(Decimal::parsed(1.5, "1.50")), Value::Number(1.5.into()));
    }

    #[test]
    fn timestamps_compare_by_instant_and_keep_their_offset() {
        let at = |raw: &str| Timestamp::zoned(DateTime::parse_from_rfc3339(raw).unwrap(), raw.ends_with('Z'));
        let east = at("2021-03-04T12:20:30+02:00");
        let utc = at("2021-03-04T10:20:30Z");
        assert_eq!(east, utc);
        assert_eq!(east.to_string(), "2021-03-04T12:20:30+02:00");
        assert_eq!(utc.to_string(), "2021-03-04T10:20:30Z");
        assert_eq!(at("2021-03-04T10:20:30-05:30").to_string(), "2021-03-04T10:20:30-05:30");
        assert!(at("2021-03-04T10:20:31+02:00") < utc);
        assert_eq!(east.format_with("%d/%m/%Y %H:%M %:z").unwrap(), "04/03/2021 12:20 +02:00");
    }

    #[test]
    fn cell_to_string_renders_json_cells() {
        assert_eq!(cell_to_string(&Cell::Null), "");
        assert_eq!(cell_to_string(&Cell::from("x")), "x");
        assert_eq!(cell_to_string(&Cell::from(3)), "3");
    }
}
