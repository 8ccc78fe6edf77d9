//! Host built-ins visible to scripts: the global allow-list.

use chrono::{DateTime, Utc};
use quire_value::{native_from_json, native_to_json, parse_number, NativeValue, ValueError};

/// Names the allow-list provides.
pub const GLOBALS: &[&str] = &[
    "Math",
    "JSON",
    "Object",
    "Array",
    "Date",
    "console",
    "Number",
    "String",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "NaN",
    "Infinity",
];

pub fn is_global(name: &str) -> bool {
    GLOBALS.contains(&name)
}

/// Build the built-in bound to `name`, if any.
pub fn global(name: &str) -> Option<NativeValue> {
    let value = match name {
        "Math" => math(),
        "JSON" => json(),
        "Object" => object(),
        "Array" => array(),
        "Date" => date(),
        "console" => console(),
        "Number" => NativeValue::function("Number", |args| {
            Ok(NativeValue::Number(arg(args, 0).to_number()))
        }),
        "String" => NativeValue::function("String", |args| Ok(NativeValue::string(arg(args, 0).to_string()))),
        "Boolean" => NativeValue::function("Boolean", |args| Ok(NativeValue::Bool(arg(args, 0).is_truthy()))),
        "parseInt" => NativeValue::function("parseInt", |args| {
            let radix = match arg(args, 1) {
                NativeValue::Undefined => 10,
                r => r.to_number() as u32,
            };
            Ok(NativeValue::Number(parse_int(&arg(args, 0).to_string(), radix)))
        }),
        "parseFloat" => NativeValue::function("parseFloat", |args| {
            Ok(NativeValue::Number(parse_float(&arg(args, 0).to_string())))
        }),
        "isNaN" => NativeValue::function("isNaN", |args| Ok(NativeValue::Bool(arg(args, 0).to_number().is_nan()))),
        "isFinite" => NativeValue::function("isFinite", |args| {
            Ok(NativeValue::Bool(arg(args, 0).to_number().is_finite()))
        }),
        "NaN" => NativeValue::Number(f64::NAN),
        "Infinity" => NativeValue::Number(f64::INFINITY),
        _ => return None,
    };
    Some(value)
}

pub(crate) fn arg(args: &[NativeValue], i: usize) -> NativeValue {
    args.get(i).cloned().unwrap_or(NativeValue::Undefined)
}

fn number_fn(name: &'static str, f: fn(f64) -> f64) -> (&'static str, NativeValue) {
    (name, NativeValue::function(format!("Math.{name}"), move |args| {
        Ok(NativeValue::Number(f(arg(args, 0).to_number())))
    }))
}

// ══════════════════════════════════════════════════════════════════════
// Math
// ══════════════════════════════════════════════════════════════════════

fn math() -> NativeValue {
    let mut entries = vec![
        ("PI", NativeValue::Number(std::f64::consts::PI)),
        ("E", NativeValue::Number(std::f64::consts::E)),
        ("LN2", NativeValue::Number(std::f64::consts::LN_2)),
        ("LN10", NativeValue::Number(std::f64::consts::LN_10)),
        ("SQRT2", NativeValue::Number(std::f64::consts::SQRT_2)),
        number_fn("abs", f64::abs),
        number_fn("floor", f64::floor),
        number_fn("ceil", f64::ceil),
        // Halves round toward positive infinity
        number_fn("round", |x| (x + 0.5).floor()),
        number_fn("trunc", f64::trunc),
        number_fn("sign", |x| if x.is_nan() || x == 0.0 { x } else { x.signum() }),
        number_fn("sqrt", f64::sqrt),
        number_fn("cbrt", f64::cbrt),
        number_fn("sin", f64::sin),
        number_fn("cos", f64::cos),
        number_fn("tan", f64::tan),
        number_fn("asin", f64::asin),
        number_fn("acos", f64::acos),
        number_fn("atan", f64::atan),
        number_fn("exp", f64::exp),
        number_fn("log", f64::ln),
        number_fn("log2", f64::log2),
        number_fn("log10", f64::log10),
    ];
    entries.push((
        "atan2",
        NativeValue::function("Math.atan2", |args| {
            Ok(NativeValue::Number(arg(args, 0).to_number().atan2(arg(args, 1).to_number())))
        }),
    ));
    entries.push((
        "pow",
        NativeValue::function("Math.pow", |args| {
            Ok(NativeValue::Number(arg(args, 0).to_number().powf(arg(args, 1).to_number())))
        }),
    ));
    entries.push((
        "hypot",
        NativeValue::function("Math.hypot", |args| {
            let sum: f64 = args.iter().map(|a| a.to_number().powi(2)).sum();
            Ok(NativeValue::Number(sum.sqrt()))
        }),
    ));
    entries.push((
        "min",
        NativeValue::function("Math.min", |args| Ok(NativeValue::Number(fold_extreme(args, f64::INFINITY, f64::min)))),
    ));
    entries.push((
        "max",
        NativeValue::function("Math.max", |args| {
            Ok(NativeValue::Number(fold_extreme(args, f64::NEG_INFINITY, f64::max)))
        }),
    ));
    NativeValue::object(entries)
}

/// `Math.min`/`Math.max`: any NaN argument makes the result NaN.
fn fold_extreme(args: &[NativeValue], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut acc = init;
    for value in args {
        let n = value.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = pick(acc, n);
    }
    acc
}

// ══════════════════════════════════════════════════════════════════════
// JSON
// ══════════════════════════════════════════════════════════════════════

fn json() -> NativeValue {
    NativeValue::object([
        (
            "stringify",
            NativeValue::function("JSON.stringify", |args| {
                let Some(json) = native_to_json(&arg(args, 0))? else {
                    return Ok(NativeValue::Undefined);
                };
                let indent = arg(args, 2).to_number();
                let text = if indent.is_finite() && indent >= 1.0 {
                    serde_json::to_string_pretty(&json)
                } else {
                    serde_json::to_string(&json)
                }
                .map_err(|e| ValueError::runtime(format!("JSON.stringify: {e}")))?;
                Ok(NativeValue::string(text))
            }),
        ),
        (
            "parse",
            NativeValue::function("JSON.parse", |args| {
                let text = arg(args, 0).to_string();
                let json: serde_json::Value = serde_json::from_str(&text)
                    .map_err(|e| ValueError::runtime(format!("JSON.parse: {e}")))?;
                Ok(native_from_json(&json))
            }),
        ),
    ])
}

// ══════════════════════════════════════════════════════════════════════
// Object, Array, Date, console
// ══════════════════════════════════════════════════════════════════════

pub(crate) fn object_entries(value: &NativeValue) -> Vec<(String, NativeValue)> {
    match value {
        NativeValue::Object(map) => map.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        NativeValue::Array(items) => items
            .borrow()
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        NativeValue::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), NativeValue::string(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn object() -> NativeValue {
    NativeValue::object([
        (
            "keys",
            NativeValue::function("Object.keys", |args| {
                let keys = object_entries(&arg(args, 0)).into_iter().map(|(k, _)| NativeValue::string(k));
                Ok(NativeValue::array(keys.collect()))
            }),
        ),
        (
            "values",
            NativeValue::function("Object.values", |args| {
                let values = object_entries(&arg(args, 0)).into_iter().map(|(_, v)| v);
                Ok(NativeValue::array(values.collect()))
            }),
        ),
        (
            "entries",
            NativeValue::function("Object.entries", |args| {
                let pairs = object_entries(&arg(args, 0))
                    .into_iter()
                    .map(|(k, v)| NativeValue::array(vec![NativeValue::string(k), v]));
                Ok(NativeValue::array(pairs.collect()))
            }),
        ),
        (
            "assign",
            NativeValue::function("Object.assign", |args| {
                let target = arg(args, 0);
                let NativeValue::Object(map) = &target else {
                    return Err(ValueError::runtime("Object.assign target must be an object"));
                };
                for source in args.iter().skip(1) {
                    let entries = object_entries(source);
                    map.modify()?.extend(entries);
                }
                Ok(target)
            }),
        ),
    ])
}

fn array() -> NativeValue {
    NativeValue::object([
        (
            "isArray",
            NativeValue::function("Array.isArray", |args| {
                Ok(NativeValue::Bool(matches!(arg(args, 0), NativeValue::Array(_))))
            }),
        ),
        (
            "from",
            NativeValue::function("Array.from", |args| {
                let values = object_entries(&arg(args, 0)).into_iter().map(|(_, v)| v);
                Ok(NativeValue::array(values.collect()))
            }),
        ),
    ])
}

fn date() -> NativeValue {
    NativeValue::object([(
        "fromTimestamp",
        NativeValue::function("Date.fromTimestamp", |args| {
            let seconds = arg(args, 0).to_number();
            if !seconds.is_finite() {
                return Err(ValueError::runtime("Date.fromTimestamp expects a finite number of seconds"));
            }
            DateTime::<Utc>::from_timestamp_millis((seconds * 1000.0).round() as i64)
                .map(NativeValue::Date)
                .ok_or_else(|| ValueError::runtime(format!("timestamp {seconds} is out of range")))
        }),
    )])
}

fn console_line(args: &[NativeValue]) -> String {
    args.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

fn console() -> NativeValue {
    NativeValue::object([
        (
            "log",
            NativeValue::function("console.log", |args| {
                tracing::info!(target: "quire::script", "{}", console_line(args));
                Ok(NativeValue::Undefined)
            }),
        ),
        (
            "warn",
            NativeValue::function("console.warn", |args| {
                tracing::warn!(target: "quire::script", "{}", console_line(args));
                Ok(NativeValue::Undefined)
            }),
        ),
        (
            "error",
            NativeValue::function("console.error", |args| {
                tracing::error!(target: "quire::script", "{}", console_line(args));
                Ok(NativeValue::Undefined)
            }),
        ),
    ])
}

// ══════════════════════════════════════════════════════════════════════
// Number parsing
// ══════════════════════════════════════════════════════════════════════

/// Parse the leading integer of `text` in `radix`; `NaN` when there is none.
fn parse_int(text: &str, radix: u32) -> f64 {
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let trimmed = text.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let mut value: Option<f64> = None;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        value = Some(value.unwrap_or(0.0) * f64::from(radix) + f64::from(d));
    }
    value.map_or(f64::NAN, |v| sign * v)
}

/// Parse the longest numeric prefix of `text`.
fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    if trimmed.starts_with("Infinity") || trimmed.starts_with("+Infinity") {
        return f64::INFINITY;
    }
    if trimmed.starts_with("-Infinity") {
        return f64::NEG_INFINITY;
    }
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &trimmed[digits_start..end] == "." {
        return f64::NAN;
    }
    let mantissa_end = end;
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    let candidate = if end > mantissa_end { &trimmed[..end] } else { &trimmed[..mantissa_end] };
    parse_number(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(value: &NativeValue, args: &[NativeValue]) -> NativeValue {
        match value {
            NativeValue::Function(f) => f.call(args).unwrap(),
            other => panic!("not a function: {other:?}"),
        }
    }

    fn member(value: &NativeValue, key: &str) -> NativeValue {
        match value {
            NativeValue::Object(map) => map.borrow().get(key).cloned().unwrap(),
            other => panic!("not an object: {other:?}"),
        }
    }

    #[test]
    fn test_every_listed_global_resolves() {
        for name in GLOBALS {
            assert!(global(name).is_some(), "{name} missing");
        }
        assert!(global("process").is_none());
        assert!(!is_global("require"));
    }

    #[test]
    fn test_math_round_and_extremes() {
        let math = global("Math").unwrap();
        let round = member(&math, "round");
        assert_eq!(call(&round, &[NativeValue::Number(2.5)]).as_number(), Some(3.0));
        assert_eq!(call(&round, &[NativeValue::Number(-2.5)]).as_number(), Some(-2.0));
        let max = member(&math, "max");
        assert_eq!(call(&max, &[]).as_number(), Some(f64::NEG_INFINITY));
    }

    #[test]
    fn test_json_round_trip() {
        let json = global("JSON").unwrap();
        let parsed = call(&member(&json, "parse"), &[NativeValue::string(r#"{"a":[1,2]}"#)]);
        let text = call(&member(&json, "stringify"), &[parsed]);
        assert_eq!(text.as_str(), Some(r#"{"a":[1,2]}"#));
    }

    #[test]
    fn test_parse_int_and_float() {
        assert_eq!(parse_int("  42px", 10), 42.0);
        assert_eq!(parse_int("-ff", 16), -255.0);
        assert!(parse_int("px", 10).is_nan());
        assert_eq!(parse_float("3.25e2abc"), 325.0);
        assert_eq!(parse_float("1e"), 1.0);
        assert!(parse_float(".").is_nan());
    }

    #[test]
    fn test_date_from_timestamp() {
        let date = global("Date").unwrap();
        let value = call(&member(&date, "fromTimestamp"), &[NativeValue::Number(0.0)]);
        assert_eq!(value.to_string(), "1970-01-01T00:00:00.000Z");
    }
}
