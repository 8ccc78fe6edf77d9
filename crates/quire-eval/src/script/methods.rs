//! Built-in methods on arrays, strings, numbers and dates.

use std::rc::Rc;

use chrono::{DateTime, Datelike, SecondsFormat, Timelike, Utc};
use quire_value::{format_number, NativeArray, NativeValue};

use super::builtins::arg;
use super::interpreter::{Exec, Interpreter};
use super::ops;
use crate::error::{EvalError, EvalResult};

impl Interpreter {
    /// `receiver.name(args)`: a built-in method if the receiver's type has
    /// one, otherwise a call of the property's value.
    pub(crate) fn call_method(
        self: &Rc<Self>,
        receiver: &NativeValue,
        name: &str,
        args: &[NativeValue],
    ) -> Exec<NativeValue> {
        let builtin = match receiver {
            NativeValue::Array(items) => self.array_method(items, name, args)?,
            NativeValue::String(s) => string_method(s, name, args)?,
            NativeValue::Number(n) => number_method(*n, name, args)?,
            NativeValue::Date(date) => date_method(date, name),
            _ => None,
        };
        if let Some(value) = builtin {
            return Ok(value);
        }
        let method = ops::get_property(receiver, name)?;
        if !matches!(method, NativeValue::Function(_)) {
            return Err(EvalError::type_mismatch(format!(
                "{}.{name} is not a function",
                receiver.type_of()
            ))
            .into());
        }
        self.call_value(&method, args, name)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Arrays
    // ══════════════════════════════════════════════════════════════════════

    fn array_method(
        self: &Rc<Self>,
        items: &NativeArray,
        name: &str,
        args: &[NativeValue],
    ) -> Exec<Option<NativeValue>> {
        // Callbacks may mutate the array, so they walk a snapshot
        let snapshot = || items.borrow().clone();
        let callback = arg(args, 0);
        let value = match name {
            "push" => {
                let mut items = items.modify()?;
                items.extend(args.iter().cloned());
                NativeValue::Number(items.len() as f64)
            }
            "pop" => items.modify()?.pop().unwrap_or(NativeValue::Undefined),
            "shift" => {
                let mut items = items.modify()?;
                if items.is_empty() {
                    NativeValue::Undefined
                } else {
                    items.remove(0)
                }
            }
            "unshift" => {
                let mut items = items.modify()?;
                items.splice(0..0, args.iter().cloned());
                NativeValue::Number(items.len() as f64)
            }
            "map" => {
                let mut out = Vec::new();
                for (i, item) in snapshot().into_iter().enumerate() {
                    out.push(self.call_value(&callback, &[item, index(i)], "map callback")?);
                }
                NativeValue::array(out)
            }
            "filter" => {
                let mut out = Vec::new();
                for (i, item) in snapshot().into_iter().enumerate() {
                    if self.call_value(&callback, &[item.clone(), index(i)], "filter callback")?.is_truthy() {
                        out.push(item);
                    }
                }
                NativeValue::array(out)
            }
            "forEach" => {
                for (i, item) in snapshot().into_iter().enumerate() {
                    self.call_value(&callback, &[item, index(i)], "forEach callback")?;
                }
                NativeValue::Undefined
            }
            "find" | "findIndex" => {
                let mut found = None;
                for (i, item) in snapshot().into_iter().enumerate() {
                    if self.call_value(&callback, &[item.clone(), index(i)], "find callback")?.is_truthy() {
                        found = Some((i, item));
                        break;
                    }
                }
                match (name, found) {
                    ("find", Some((_, item))) => item,
                    ("find", None) => NativeValue::Undefined,
                    (_, Some((i, _))) => index(i),
                    (_, None) => NativeValue::Number(-1.0),
                }
            }
            "some" => {
                let mut any = false;
                for (i, item) in snapshot().into_iter().enumerate() {
                    if self.call_value(&callback, &[item, index(i)], "some callback")?.is_truthy() {
                        any = true;
                        break;
                    }
                }
                NativeValue::Bool(any)
            }
            "every" => {
                let mut all = true;
                for (i, item) in snapshot().into_iter().enumerate() {
                    if !self.call_value(&callback, &[item, index(i)], "every callback")?.is_truthy() {
                        all = false;
                        break;
                    }
                }
                NativeValue::Bool(all)
            }
            "reduce" => {
                let items = snapshot();
                let (mut acc, start) = match args.get(1) {
                    Some(init) => (init.clone(), 0),
                    None => match items.first() {
                        Some(first) => (first.clone(), 1),
                        None => {
                            return Err(EvalError::type_mismatch(
                                "reduce of empty array with no initial value",
                            )
                            .into())
                        }
                    },
                };
                for (i, item) in items.into_iter().enumerate().skip(start) {
                    acc = self.call_value(&callback, &[acc, item, index(i)], "reduce callback")?;
                }
                acc
            }
            "slice" => {
                let items = items.borrow();
                let len = items.len();
                let start = relative_index(&arg(args, 0), len, 0);
                let end = relative_index(&arg(args, 1), len, len);
                let out = if start < end { items[start..end].to_vec() } else { Vec::new() };
                NativeValue::array(out)
            }
            "concat" => {
                let mut out = snapshot();
                for arg in args {
                    match arg {
                        NativeValue::Array(other) => out.extend(other.borrow().iter().cloned()),
                        other => out.push(other.clone()),
                    }
                }
                NativeValue::array(out)
            }
            "join" => {
                let sep = match arg(args, 0) {
                    NativeValue::Undefined => ",".to_string(),
                    other => other.to_string(),
                };
                let parts: Vec<String> = items
                    .borrow()
                    .iter()
                    .map(|item| if item.is_nullish() { String::new() } else { item.to_string() })
                    .collect();
                NativeValue::string(parts.join(&sep))
            }
            "indexOf" => {
                let needle = arg(args, 0);
                let position = items.borrow().iter().position(|item| item.strict_equals(&needle));
                position.map_or(NativeValue::Number(-1.0), index)
            }
            "includes" => {
                let needle = arg(args, 0);
                let nan = needle.as_number().is_some_and(f64::is_nan);
                let found = items.borrow().iter().any(|item| {
                    item.strict_equals(&needle) || (nan && item.as_number().is_some_and(f64::is_nan))
                });
                NativeValue::Bool(found)
            }
            "reverse" => {
                items.modify()?.reverse();
                NativeValue::Array(items.clone())
            }
            "sort" => {
                let mut sorted = snapshot();
                self.sort(&mut sorted, &callback)?;
                *items.modify()? = sorted;
                NativeValue::Array(items.clone())
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Stable insertion sort. Comparators may be inconsistent, so this
    /// never relies on a total order.
    fn sort(self: &Rc<Self>, items: &mut [NativeValue], comparator: &NativeValue) -> Exec<()> {
        for i in 1..items.len() {
            let mut j = i;
            while j > 0 && self.sorts_after(&items[j - 1], &items[j], comparator)? {
                items.swap(j - 1, j);
                j -= 1;
            }
        }
        Ok(())
    }

    fn sorts_after(&self, a: &NativeValue, b: &NativeValue, comparator: &NativeValue) -> Exec<bool> {
        match (a, b) {
            (NativeValue::Undefined, _) => return Ok(!matches!(b, NativeValue::Undefined)),
            (_, NativeValue::Undefined) => return Ok(false),
            _ => {}
        }
        if matches!(comparator, NativeValue::Undefined) {
            return Ok(a.to_string() > b.to_string());
        }
        let order = self.call_value(comparator, &[a.clone(), b.clone()], "sort comparator")?;
        Ok(order.to_number() > 0.0)
    }
}

fn index(i: usize) -> NativeValue {
    NativeValue::Number(i as f64)
}

/// Resolve a possibly negative position against `len`.
fn relative_index(value: &NativeValue, len: usize, default: usize) -> usize {
    if matches!(value, NativeValue::Undefined) {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

// ══════════════════════════════════════════════════════════════════════
// Strings
// ══════════════════════════════════════════════════════════════════════

fn string_arg(args: &[NativeValue], i: usize) -> String {
    match arg(args, i) {
        NativeValue::Undefined => String::new(),
        other => other.to_string(),
    }
}

fn char_slice(s: &str, start: usize, end: usize) -> String {
    s.chars().skip(start).take(end.saturating_sub(start)).collect()
}

/// Character position of a byte offset.
fn char_position(s: &str, byte: usize) -> usize {
    s[..byte].chars().count()
}

/// Longest string a script may build, in characters.
const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

fn invalid_length() -> EvalError {
    EvalError::runtime("invalid string length")
}

fn pad(s: &str, args: &[NativeValue], at_start: bool) -> EvalResult<NativeValue> {
    let target = arg(args, 0).to_number();
    let fill = match arg(args, 1) {
        NativeValue::Undefined => " ".to_string(),
        other => other.to_string(),
    };
    let len = s.chars().count();
    if !(target > len as f64) || fill.is_empty() {
        return Ok(NativeValue::string(s));
    }
    if target > MAX_STRING_LENGTH as f64 {
        return Err(invalid_length());
    }
    let padding: String = fill.chars().cycle().take(target as usize - len).collect();
    Ok(if at_start {
        NativeValue::string(format!("{padding}{s}"))
    } else {
        NativeValue::string(format!("{s}{padding}"))
    })
}

fn string_method(s: &str, name: &str, args: &[NativeValue]) -> EvalResult<Option<NativeValue>> {
    let len = s.chars().count();
    let value = match name {
        "toUpperCase" => NativeValue::string(s.to_uppercase()),
        "toLowerCase" => NativeValue::string(s.to_lowercase()),
        "trim" => NativeValue::string(s.trim()),
        "trimStart" => NativeValue::string(s.trim_start()),
        "trimEnd" => NativeValue::string(s.trim_end()),
        "toString" => NativeValue::string(s),
        "split" => {
            let limit = match arg(args, 1) {
                NativeValue::Undefined => usize::MAX,
                other => other.to_number().max(0.0) as usize,
            };
            let parts: Vec<NativeValue> = match arg(args, 0) {
                NativeValue::Undefined => vec![NativeValue::string(s)],
                sep => {
                    let sep = sep.to_string();
                    if sep.is_empty() {
                        s.chars().map(|c| NativeValue::string(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(NativeValue::string).collect()
                    }
                }
            };
            NativeValue::array(parts.into_iter().take(limit).collect())
        }
        "slice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            NativeValue::string(char_slice(s, start, end))
        }
        "substring" => {
            let bound = |v: NativeValue, default: usize| match v {
                NativeValue::Undefined => default,
                other => {
                    let n = other.to_number();
                    if n.is_nan() { 0 } else { n.clamp(0.0, len as f64) as usize }
                }
            };
            let (a, b) = (bound(arg(args, 0), 0), bound(arg(args, 1), len));
            NativeValue::string(char_slice(s, a.min(b), a.max(b)))
        }
        "charAt" => {
            let i = arg(args, 0).to_number();
            let c = if i >= 0.0 { s.chars().nth(i as usize) } else { None };
            NativeValue::string(c.map(String::from).unwrap_or_default())
        }
        "includes" => NativeValue::Bool(s.contains(string_arg(args, 0).as_str())),
        "startsWith" => NativeValue::Bool(s.starts_with(string_arg(args, 0).as_str())),
        "endsWith" => NativeValue::Bool(s.ends_with(string_arg(args, 0).as_str())),
        "indexOf" => {
            let needle = string_arg(args, 0);
            let position = s.find(needle.as_str()).map(|byte| char_position(s, byte));
            position.map_or(NativeValue::Number(-1.0), index)
        }
        "replace" => NativeValue::string(s.replacen(string_arg(args, 0).as_str(), &string_arg(args, 1), 1)),
        "replaceAll" => NativeValue::string(s.replace(string_arg(args, 0).as_str(), &string_arg(args, 1))),
        "repeat" => {
            let count = arg(args, 0).to_number();
            if !(count >= 0.0) || count.is_infinite() {
                return Err(EvalError::runtime(format!("invalid repeat count: {}", format_number(count))));
            }
            if s.is_empty() {
                return Ok(Some(NativeValue::string("")));
            }
            let total = (count as usize).checked_mul(len).filter(|&n| n <= MAX_STRING_LENGTH);
            if total.is_none() {
                return Err(invalid_length());
            }
            NativeValue::string(s.repeat(count as usize))
        }
        "padStart" => pad(s, args, true)?,
        "padEnd" => pad(s, args, false)?,
        "concat" => {
            let mut out = s.to_string();
            for arg in args {
                out.push_str(&arg.to_string());
            }
            NativeValue::string(out)
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

// ══════════════════════════════════════════════════════════════════════
// Numbers and dates
// ══════════════════════════════════════════════════════════════════════

fn number_method(n: f64, name: &str, args: &[NativeValue]) -> EvalResult<Option<NativeValue>> {
    let value = match name {
        "toFixed" => {
            let digits = match arg(args, 0) {
                NativeValue::Undefined => 0.0,
                other => other.to_number(),
            };
            if !(0.0..=100.0).contains(&digits) {
                return Err(EvalError::runtime("toFixed() digits must be between 0 and 100"));
            }
            if n.is_finite() {
                NativeValue::string(format!("{:.*}", digits as usize, n))
            } else {
                NativeValue::string(format_number(n))
            }
        }
        "toString" => match arg(args, 0) {
            NativeValue::Undefined => NativeValue::string(format_number(n)),
            radix => {
                let radix = radix.to_number();
                if !(2.0..=36.0).contains(&radix) || radix.fract() != 0.0 {
                    return Err(EvalError::runtime("toString() radix must be between 2 and 36"));
                }
                NativeValue::string(to_radix(n, radix as u32))
            }
        },
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Integral values in another base; fractions fall back to decimal.
fn to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 || n.abs() > 9_007_199_254_740_992.0 {
        return format_number(n);
    }
    let mut magnitude = n.abs() as u64;
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let digit = (magnitude % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('?'));
        magnitude /= u64::from(radix);
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn date_method(date: &DateTime<Utc>, name: &str) -> Option<NativeValue> {
    let number = |n: u32| NativeValue::Number(f64::from(n));
    let value = match name {
        "getTime" | "valueOf" => NativeValue::Number(date.timestamp_millis() as f64),
        "toISOString" | "toJSON" => NativeValue::string(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
        "toString" => NativeValue::string(date.to_rfc3339()),
        "getFullYear" | "getUTCFullYear" => NativeValue::Number(f64::from(date.year())),
        "getMonth" | "getUTCMonth" => number(date.month0()),
        "getDate" | "getUTCDate" => number(date.day()),
        "getDay" | "getUTCDay" => number(date.weekday().num_days_from_sunday()),
        "getHours" | "getUTCHours" => number(date.hour()),
        "getMinutes" | "getUTCMinutes" => number(date.minute()),
        "getSeconds" | "getUTCSeconds" => number(date.second()),
        "getMilliseconds" | "getUTCMilliseconds" => number(date.timestamp_subsec_millis()),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str, name: &str, args: &[NativeValue]) -> NativeValue {
        string_method(s, name, args).unwrap().unwrap()
    }

    #[test]
    fn test_relative_index() {
        let len = 5;
        assert_eq!(relative_index(&NativeValue::Number(-2.0), len, 0), 3);
        assert_eq!(relative_index(&NativeValue::Number(-9.0), len, 0), 0);
        assert_eq!(relative_index(&NativeValue::Number(7.0), len, 0), 5);
        assert_eq!(relative_index(&NativeValue::Undefined, len, 5), 5);
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(call("héllo", "slice", &[NativeValue::Number(1.0), NativeValue::Number(3.0)]).as_str(), Some("él"));
        assert_eq!(call("héllo", "indexOf", &[NativeValue::string("l")]).as_number(), Some(2.0));
        assert_eq!(call("7", "padStart", &[NativeValue::Number(3.0), NativeValue::string("0")]).as_str(), Some("007"));
        assert_eq!(call("a-b-c", "replace", &[NativeValue::string("-"), NativeValue::string("+")]).as_str(), Some("a+b-c"));
        assert!(string_method("x", "nope", &[]).unwrap().is_none());
    }

    #[test]
    fn test_split_with_limit() {
        let parts = call("a,b,c", "split", &[NativeValue::string(","), NativeValue::Number(2.0)]);
        assert_eq!(parts.to_string(), "a,b");
    }

    #[test]
    fn test_number_formatting() {
        let fixed = number_method(3.14159, "toFixed", &[NativeValue::Number(2.0)]).unwrap().unwrap();
        assert_eq!(fixed.as_str(), Some("3.14"));
        assert_eq!(to_radix(255.0, 16), "ff");
        assert_eq!(to_radix(-5.0, 2), "-101");
        assert_eq!(to_radix(1.5, 2), "1.5");
    }

    #[test]
    fn test_date_getters() {
        let date = DateTime::<Utc>::from_timestamp_millis(86_400_000 + 1_500).unwrap();
        assert_eq!(date_method(&date, "getUTCDate").unwrap().as_number(), Some(2.0));
        assert_eq!(date_method(&date, "getUTCSeconds").unwrap().as_number(), Some(1.0));
        assert_eq!(
            date_method(&date, "toISOString").unwrap().as_str(),
            Some("1970-01-02T00:00:01.500Z")
        );
    }
}
