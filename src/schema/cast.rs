//! Per-type cell casting.
//!
//! One read and one write function per [`FieldType`] variant, selected by `match`. The
//! functions know nothing about missing values or constraints; [`super::Field`] layers
//! those on top.

use std::fmt::{self, Write as _};
use std::sync::LazyLock;

use base64::Engine as _;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;

use crate::types::{Cell, Decimal, FieldType, GeoPoint, IsoDuration, Timestamp, Value};

/// Field format variant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Default,
    /// Best-effort parsing (temporal types only; treated as `Default` elsewhere).
    Any,
    /// Type-specific named format (`email`, `array`, ...) or a strftime pattern.
    Custom(String),
}

impl Format {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("default") => Format::Default,
            Some("any") => Format::Any,
            Some(other) => Format::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Format::Default => "default",
            Format::Any => "any",
            Format::Custom(s) => s,
        }
    }

    fn named(&self) -> Option<&str> {
        match self {
            Format::Custom(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Type options that affect casting.
#[derive(Debug, Clone, PartialEq)]
pub struct CastOptions {
    pub true_values: Vec<String>,
    pub false_values: Vec<String>,
    pub bare_number: bool,
    pub group_char: Option<String>,
    pub decimal_char: String,
}

pub const DEFAULT_TRUE_VALUES: [&str; 4] = ["true", "True", "TRUE", "1"];
pub const DEFAULT_FALSE_VALUES: [&str; 4] = ["false", "False", "FALSE", "0"];

impl Default for CastOptions {
    fn default() -> Self {
        Self {
            true_values: DEFAULT_TRUE_VALUES.iter().map(|s| s.to_string()).collect(),
            false_values: DEFAULT_FALSE_VALUES.iter().map(|s| s.to_string()).collect(),
            bare_number: true,
            group_char: None,
            decimal_char: ".".to_string(),
        }
    }
}

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static regex"));
static URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s]+$").expect("static regex"));
static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex")
});
static YEARMONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").expect("static regex"));

const GEOJSON_TYPES: [&str; 9] = [
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
    "Feature",
    "FeatureCollection",
];

const ANY_DATE_PATTERNS: [&str; 10] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%Y%m%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%b %d, %Y",
];

const ANY_TIME_PATTERNS: [&str; 5] = ["%H:%M:%S", "%H:%M:%S%.f", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

const ANY_DATETIME_PATTERNS: [&str; 7] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

/// Cast a raw cell to `field_type`; `None` means the cast failed.
pub fn read(field_type: FieldType, format: &Format, options: &CastOptions, cell: &Cell) -> Option<Value> {
    match field_type {
        FieldType::Any => Some(Value::Any(cell.clone())),
        FieldType::Array => read_json(cell).and_then(|c| match c {
            Cell::Array(items) => Some(Value::Array(items)),
            _ => None,
        }),
        FieldType::Object => read_json(cell).and_then(|c| match c {
            Cell::Object(map) => Some(Value::Object(map)),
            _ => None,
        }),
        FieldType::Boolean => read_boolean(options, cell),
        FieldType::Integer => read_integer(options, cell),
        FieldType::Number => read_number(options, cell),
        FieldType::Year => read_year(cell),
        FieldType::Yearmonth => read_yearmonth(cell),
        FieldType::Date => read_date(format, cell.as_str()?),
        FieldType::Time => read_time(format, cell.as_str()?),
        FieldType::Datetime => read_datetime(format, cell.as_str()?),
        FieldType::Duration => cell.as_str()?.parse::<IsoDuration>().ok().map(Value::Duration),
        FieldType::Geopoint => read_geopoint(format, cell),
        FieldType::Geojson => read_geojson(format, cell),
        FieldType::String => read_string(format, cell),
    }
}

/// Serialize a typed value back to its raw text; `None` means the value does not belong
/// to `field_type`.
pub fn write(field_type: FieldType, format: &Format, options: &CastOptions, value: &Value) -> Option<String> {
    match (field_type, value) {
        (FieldType::Any, v) => Some(v.to_string()),
        (FieldType::Array, Value::Array(items)) => {
            serde_json::to_string(&Cell::Array(items.clone())).ok()
        }
        (FieldType::Object, Value::Object(map)) | (FieldType::Geojson, Value::Geojson(map)) => {
            serde_json::to_string(&Cell::Object(map.clone())).ok()
        }
        (FieldType::Boolean, Value::Boolean(b)) => {
            let tokens = if *b { &options.true_values } else { &options.false_values };
            tokens.first().cloned()
        }
        (FieldType::Integer, Value::Integer(i)) => Some(i.to_string()),
        (FieldType::Number, Value::Number(n)) => {
            if let Some(text) = n.text() {
                return Some(text.to_string());
            }
            let text = n.to_string();
            Some(if options.decimal_char != "." {
                text.replace('.', &options.decimal_char)
            } else {
                text
            })
        }
        (FieldType::Year, Value::Year(y)) => Some(y.to_string()),
        (FieldType::Yearmonth, Value::Yearmonth { year, month }) => {
            Some(format!("{year:04}-{month:02}"))
        }
        (FieldType::Date, Value::Date(d)) => {
            let pattern = format.named().unwrap_or("%Y-%m-%d");
            render(d.format(pattern))
        }
        (FieldType::Time, Value::Time(t)) => {
            let default = if t.nanosecond() == 0 { "%H:%M:%S" } else { "%H:%M:%S%.f" };
            render(t.format(format.named().unwrap_or(default)))
        }
        (FieldType::Datetime, Value::Datetime(ts)) => match format.named() {
            Some(pattern) => ts.format_with(pattern),
            None => Some(ts.to_string()),
        },
        (FieldType::Duration, Value::Duration(d)) => Some(d.to_string()),
        (FieldType::Geopoint, Value::Geopoint(p)) => Some(match format.named() {
            Some("array") => format!("[{}, {}]", p.lon, p.lat),
            Some("object") => format!("{{\"lon\": {}, \"lat\": {}}}", p.lon, p.lat),
            _ => format!("{}, {}", p.lon, p.lat),
        }),
        (FieldType::String, Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Render a chrono formatter; invalid custom patterns yield `None` instead of panicking.
fn render(item: impl fmt::Display) -> Option<String> {
    let mut out = String::new();
    write!(out, "{item}").ok()?;
    Some(out)
}

fn read_json(cell: &Cell) -> Option<Cell> {
    match cell {
        Cell::String(s) => serde_json::from_str::<Cell>(s).ok(),
        Cell::Array(_) | Cell::Object(_) => Some(cell.clone()),
        _ => None,
    }
}

fn read_boolean(options: &CastOptions, cell: &Cell) -> Option<Value> {
    match cell {
        Cell::Bool(b) => Some(Value::Boolean(*b)),
        Cell::String(s) => {
            if options.true_values.iter().any(|t| t == s) {
                Some(Value::Boolean(true))
            } else if options.false_values.iter().any(|f| f == s) {
                Some(Value::Boolean(false))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Apply group/decimal separators and bare-number stripping.
fn normalize_number(options: &CastOptions, raw: &str, allow_decimal: bool) -> String {
    let mut text = raw.to_string();
    if let Some(group) = options.group_char.as_deref().filter(|g| !g.is_empty()) {
        text = text.replace(group, "");
    }
    if allow_decimal && options.decimal_char != "." {
        text = text.replace(&options.decimal_char, ".");
    }
    if !options.bare_number {
        let keep = |c: char| c.is_ascii_digit() || c == '-' || c == '+' || (allow_decimal && c == '.');
        let start = text.find(keep).unwrap_or(text.len());
        let end = text
            .rfind(|c: char| c.is_ascii_digit() || (allow_decimal && c == '.'))
            .map(|i| i + 1)
            .unwrap_or(start);
        text = if start < end { text[start..end].to_string() } else { String::new() };
    }
    text
}

fn read_integer(options: &CastOptions, cell: &Cell) -> Option<Value> {
    match cell {
        Cell::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Value::Integer(i))
            } else {
                let f = n.as_f64()?;
                (f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(Value::Integer(f as i64))
            }
        }
        Cell::String(s) => {
            let text = normalize_number(options, s, false);
            let digits = text.strip_prefix(['-', '+']).unwrap_or(&text);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            text.parse::<i64>().ok().map(Value::Integer)
        }
        _ => None,
    }
}

fn read_number(options: &CastOptions, cell: &Cell) -> Option<Value> {
    match cell {
        Cell::Number(n) => n.as_f64().map(|f| Value::Number(f.into())),
        Cell::String(s) => {
            let special = match s.as_str() {
                "NaN" | "nan" => Some(f64::NAN),
                "INF" | "Infinity" | "inf" => Some(f64::INFINITY),
                "-INF" | "-Infinity" | "-inf" => Some(f64::NEG_INFINITY),
                _ => None,
            };
            if let Some(value) = special {
                return Some(Value::Number(Decimal::parsed(value, s.as_str())));
            }
            let text = normalize_number(options, s, true);
            let plain = text
                .bytes()
                .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
            if text.is_empty() || !plain || !text.bytes().any(|b| b.is_ascii_digit()) {
                return None;
            }
            let value = text.parse::<f64>().ok()?;
            Some(Value::Number(Decimal::parsed(value, s.as_str())))
        }
        _ => None,
    }
}

fn read_year(cell: &Cell) -> Option<Value> {
    match cell {
        Cell::Number(n) => {
            let y = n.as_i64()?;
            (0..=9999).contains(&y).then_some(Value::Year(y as i32))
        }
        Cell::String(s) => {
            if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse::<i32>().ok().map(Value::Year)
        }
        _ => None,
    }
}

fn read_yearmonth(cell: &Cell) -> Option<Value> {
    let (year, month) = match cell {
        Cell::String(s) => {
            let caps = YEARMONTH.captures(s)?;
            (caps[1].parse::<i32>().ok()?, caps[2].parse::<u32>().ok()?)
        }
        Cell::Array(items) if items.len() == 2 => {
            (i32::try_from(items[0].as_i64()?).ok()?, u32::try_from(items[1].as_u64()?).ok()?)
        }
        _ => return None,
    };
    (1..=12).contains(&month).then_some(Value::Yearmonth { year, month })
}

fn read_date(format: &Format, raw: &str) -> Option<Value> {
    let parse = |p: &str| NaiveDate::parse_from_str(raw, p).ok();
    let date = match format {
        Format::Default => parse("%Y-%m-%d"),
        Format::Any => ANY_DATE_PATTERNS.iter().copied().find_map(|p| parse(p)).or_else(|| {
            read_datetime(format, raw).and_then(|v| match v {
                Value::Datetime(ts) if ts.local.time() == NaiveTime::MIN => Some(ts.local.date()),
                _ => None,
            })
        }),
        Format::Custom(p) => parse(p.as_str()),
    };
    date.map(Value::Date)
}

fn read_time(format: &Format, raw: &str) -> Option<Value> {
    let parse = |p: &str| NaiveTime::parse_from_str(raw, p).ok();
    let time = match format {
        Format::Default => parse("%H:%M:%S").or_else(|| parse("%H:%M:%S%.f")),
        Format::Any => ANY_TIME_PATTERNS.iter().copied().find_map(|p| parse(p)),
        Format::Custom(p) => parse(p.as_str()),
    };
    time.map(Value::Time)
}

fn read_datetime(format: &Format, raw: &str) -> Option<Value> {
    let naive = |p: &str| NaiveDateTime::parse_from_str(raw, p).ok().map(Timestamp::naive);
    let default = || {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| Timestamp::zoned(dt, raw.ends_with('Z')))
            .or_else(|| naive("%Y-%m-%dT%H:%M:%S"))
            .or_else(|| naive("%Y-%m-%dT%H:%M:%S%.f"))
            .map(|ts| ts.with_fraction(Some(fraction_digits(raw))))
    };
    let value = match format {
        Format::Default => default(),
        Format::Any => default().or_else(|| ANY_DATETIME_PATTERNS.iter().copied().find_map(|p| naive(p))),
        Format::Custom(p) => DateTime::parse_from_str(raw, p)
            .ok()
            .map(|dt| Timestamp::zoned(dt, false))
            .or_else(|| naive(p.as_str())),
    };
    value.map(Value::Datetime)
}

/// Digits after the seconds' decimal point of an ISO 8601 datetime.
fn fraction_digits(raw: &str) -> u8 {
    let Some(dot) = raw.find('.') else {
        return 0;
    };
    let digits = raw[dot + 1..].bytes().take_while(u8::is_ascii_digit).count();
    u8::try_from(digits).unwrap_or(u8::MAX)
}

fn read_geopoint(format: &Format, cell: &Cell) -> Option<Value> {
    let point = |lon: f64, lat: f64| {
        ((-180.0..=180.0).contains(&lon) && (-90.0..=90.0).contains(&lat))
            .then_some(Value::Geopoint(GeoPoint { lon, lat }))
    };
    match format.named() {
        Some("array") => match read_json(cell)? {
            Cell::Array(items) if items.len() == 2 => point(items[0].as_f64()?, items[1].as_f64()?),
            _ => None,
        },
        Some("object") => match read_json(cell)? {
            Cell::Object(map) if map.len() == 2 => {
                point(map.get("lon")?.as_f64()?, map.get("lat")?.as_f64()?)
            }
            _ => None,
        },
        _ => {
            let (lon, lat) = cell.as_str()?.split_once(',')?;
            point(lon.trim().parse().ok()?, lat.trim().parse().ok()?)
        }
    }
}

fn read_geojson(format: &Format, cell: &Cell) -> Option<Value> {
    let Cell::Object(map) = read_json(cell)? else {
        return None;
    };
    let kind = map.get("type")?.as_str()?;
    let valid = match format.named() {
        Some("topojson") => kind == "Topology" && map.contains_key("objects") && map.contains_key("arcs"),
        _ => GEOJSON_TYPES.contains(&kind),
    };
    valid.then_some(Value::Geojson(map))
}

fn read_string(format: &Format, cell: &Cell) -> Option<Value> {
    let Cell::String(s) = cell else {
        return None;
    };
    let valid = match format.named() {
        Some("email") => EMAIL.is_match(s),
        Some("uri") => URI.is_match(s),
        Some("uuid") => UUID.is_match(s),
        Some("binary") => base64::engine::general_purpose::STANDARD.decode(s).is_ok(),
        _ => true,
    };
    valid.then(|| Value::String(s.clone()))
}
