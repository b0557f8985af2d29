//! `Date`: a millisecond timestamp, always read and written in UTC.
//!
//! The sandbox has no host time zone, so local-time accessors and
//! formatters behave as their UTC counterparts.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::interpreter::{throw, Completion};
use crate::value::*;

const MAX_TIME: f64 = 8.64e15;
const MS_PER_DAY: f64 = 86_400_000.0;
/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

pub(crate) const METHODS: &[&str] = &[
    "getTime",
    "valueOf",
    "getFullYear",
    "getMonth",
    "getDate",
    "getDay",
    "getHours",
    "getMinutes",
    "getSeconds",
    "getMilliseconds",
    "getUTCFullYear",
    "getUTCMonth",
    "getUTCDate",
    "getUTCDay",
    "getUTCHours",
    "getUTCMinutes",
    "getUTCSeconds",
    "getUTCMilliseconds",
    "getTimezoneOffset",
    "toISOString",
    "toJSON",
    "toString",
    "toDateString",
    "toTimeString",
    "toUTCString",
    "toLocaleDateString",
    "toLocaleTimeString",
    "toLocaleString",
    "setTime",
    "setFullYear",
    "setMonth",
    "setDate",
    "setHours",
    "setMinutes",
    "setSeconds",
    "setMilliseconds",
    "setUTCFullYear",
    "setUTCMonth",
    "setUTCDate",
    "setUTCHours",
    "setUTCMinutes",
    "setUTCSeconds",
    "setUTCMilliseconds",
];

pub(crate) fn now() -> f64 {
    Utc::now().timestamp_millis() as f64
}

fn time_clip(t: f64) -> f64 {
    if !t.is_finite() || t.abs() > MAX_TIME {
        f64::NAN
    } else {
        t.trunc() + 0.0
    }
}

fn to_datetime(t: f64) -> Option<DateTime<Utc>> {
    if !t.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis(t as i64)
}

/// Timestamp for `[year, month0, day, hour, minute, second, millisecond]`.
/// Out-of-range fields carry into the next larger one.
pub(crate) fn make_time(parts: [f64; 7]) -> f64 {
    if parts.iter().any(|part| !part.is_finite()) {
        return f64::NAN;
    }
    let [year, month, day, hour, minute, second, ms] = parts.map(f64::trunc);
    let year = year + (month / 12.0).floor();
    if year.abs() > 400_000.0 {
        return f64::NAN;
    }
    let month = month.rem_euclid(12.0);
    let Some(first) = NaiveDate::from_ymd_opt(year as i32, month as u32 + 1, 1) else {
        return f64::NAN;
    };
    let days = f64::from(first.num_days_from_ce() - EPOCH_DAYS_FROM_CE) + day - 1.0;
    time_clip(days * MS_PER_DAY + hour * 3_600_000.0 + minute * 60_000.0 + second * 1_000.0 + ms)
}

/// `[year, month0, day, hour, minute, second, millisecond]` of a timestamp.
fn fields(t: f64) -> Option<[f64; 7]> {
    let dt = to_datetime(t)?;
    Some([
        f64::from(dt.year()),
        f64::from(dt.month0()),
        f64::from(dt.day()),
        f64::from(dt.hour()),
        f64::from(dt.minute()),
        f64::from(dt.second()),
        f64::from(dt.timestamp_subsec_millis()),
    ])
}

/// Parse ISO 8601, RFC 2822 and a few common human layouts. Strings
/// without an offset are read as UTC.
pub(crate) fn parse(text: &str) -> f64 {
    let text = text.trim();
    let text = text.split(" (").next().unwrap_or(text);
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return time_clip(dt.timestamp_millis() as f64);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return time_clip(dt.timestamp_millis() as f64);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%a %b %d %Y %H:%M:%S GMT%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return time_clip(dt.timestamp_millis() as f64);
        }
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%m/%d/%Y %H:%M:%S",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return time_clip(naive.and_utc().timestamp_millis() as f64);
        }
    }
    for format in ["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%b %d %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date_millis(date);
        }
    }
    match text.len() {
        7 => NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").map_or(f64::NAN, date_millis),
        4 if text.bytes().all(|b| b.is_ascii_digit()) => {
            NaiveDate::parse_from_str(&format!("{text}-01-01"), "%Y-%m-%d").map_or(f64::NAN, date_millis)
        }
        _ => f64::NAN,
    }
}

fn date_millis(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce() - EPOCH_DAYS_FROM_CE) * MS_PER_DAY
}

fn format(t: f64, layout: &str) -> String {
    to_datetime(t).map_or_else(|| "Invalid Date".to_string(), |dt| dt.format(layout).to_string())
}

/// `toISOString`; `None` for an invalid date.
pub(crate) fn iso_string(t: f64) -> Option<String> {
    to_datetime(t).map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// `String(date)`.
pub(crate) fn display_string(t: f64) -> String {
    format(t, "%a %b %d %Y %H:%M:%S GMT+0000 (Coordinated Universal Time)")
}

/// Timestamp from `Date.UTC` / `new Date(y, m, ...)` arguments. Years
/// 0 to 99 mean 1900 to 1999.
fn from_components(args: &[Value]) -> f64 {
    let mut parts = [f64::NAN, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
    for (slot, arg) in parts.iter_mut().zip(args) {
        *slot = to_number(arg);
    }
    let year = parts[0].trunc();
    if (0.0..=99.0).contains(&year) {
        parts[0] = 1900.0 + year;
    }
    make_time(parts)
}

/// `Date()`, `Date.now`, `Date.parse` and `Date.UTC`.
pub(crate) fn call_static(path: &str, args: &[Value]) -> Completion<Value> {
    let first = args.first().cloned().unwrap_or_default();
    Ok(match path {
        "Date" => Value::String(display_string(now())),
        "Date.now" => Value::Number(now()),
        "Date.parse" => Value::Number(parse(&to_string(&first))),
        "Date.UTC" => Value::Number(from_components(args)),
        other => return throw("TypeError", format!("{other} is not a function")),
    })
}

/// `new Date(...)`.
pub(crate) fn construct(args: &[Value]) -> Value {
    let t = match args {
        [] => now(),
        [Value::String(text)] => parse(text),
        [single] => date_value(single).unwrap_or_else(|| time_clip(to_number(single))),
        _ => from_components(args),
    };
    Value::internal(Internal::Date(t))
}

fn set_time(obj: &ObjectRef, t: f64) -> Value {
    if let Some(Internal::Date(time)) = &mut lock(obj).internal {
        *time = t;
    }
    Value::Number(t)
}

/// A `Date` instance method. `getUTC*` and `setUTC*` share the plain
/// implementations.
pub(crate) fn call_method(obj: &ObjectRef, name: &str, args: &[Value]) -> Completion<Value> {
    let t = match lock(obj).internal {
        Some(Internal::Date(t)) => t,
        _ => return throw("TypeError", "this is not a Date object."),
    };
    let plain = if name.starts_with("getUTC") || name.starts_with("setUTC") {
        name.replacen("UTC", "", 1)
    } else {
        name.to_string()
    };
    let string = |layout: &str| Value::String(format(t, layout));
    Ok(match plain.as_str() {
        "getTime" | "valueOf" => Value::Number(t),
        "getTimezoneOffset" => Value::Number(if t.is_nan() { f64::NAN } else { 0.0 }),
        "getDay" => Value::Number(
            to_datetime(t).map_or(f64::NAN, |dt| f64::from(dt.weekday().num_days_from_sunday())),
        ),
        getter if getter.starts_with("get") => {
            let Some(index) = field_index(&getter[3..]) else {
                return throw("TypeError", format!("date.{name} is not a function"));
            };
            Value::Number(fields(t).map_or(f64::NAN, |parts| parts[index]))
        }
        "toISOString" => match iso_string(t) {
            Some(text) => Value::String(text),
            None => return throw("RangeError", "Invalid time value"),
        },
        "toJSON" => iso_string(t).map_or(Value::Null, Value::String),
        "toString" => Value::String(display_string(t)),
        "toDateString" => string("%a %b %d %Y"),
        "toTimeString" => string("%H:%M:%S GMT+0000 (Coordinated Universal Time)"),
        "toUTCString" => string("%a, %d %b %Y %H:%M:%S GMT"),
        "toLocaleDateString" => string("%-m/%-d/%Y"),
        "toLocaleTimeString" => string("%-I:%M:%S %p"),
        "toLocaleString" => string("%-m/%-d/%Y, %-I:%M:%S %p"),
        "setTime" => set_time(obj, time_clip(args.first().map_or(f64::NAN, to_number))),
        setter if setter.starts_with("set") => {
            let Some(index) = field_index(&setter[3..]) else {
                return throw("TypeError", format!("date.{name} is not a function"));
            };
            // setFullYear on an invalid date starts from the epoch
            let base = if index == 0 && t.is_nan() { fields(0.0) } else { fields(t) };
            match (base, args.is_empty()) {
                (Some(mut parts), false) => {
                    let arity = [3, 2, 1, 4, 3, 2, 1][index];
                    for (offset, arg) in args.iter().take(arity).enumerate() {
                        parts[index + offset] = to_number(arg);
                    }
                    set_time(obj, make_time(parts))
                }
                _ => set_time(obj, f64::NAN),
            }
        }
        _ => return throw("TypeError", format!("date.{name} is not a function")),
    })
}

fn field_index(field: &str) -> Option<usize> {
    Some(match field {
        "FullYear" => 0,
        "Month" => 1,
        "Date" => 2,
        "Hours" => 3,
        "Minutes" => 4,
        "Seconds" => 5,
        "Milliseconds" => 6,
        _ => return None,
    })
}
