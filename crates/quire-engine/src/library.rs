//! The `lib` root binding: helpers for graphics-like data.
//!
//! `translate` and `rotate` rewrite every `{x, y}` mapping with numeric
//! coordinates found anywhere inside their argument, descending through
//! lists and mappings and leaving everything else untouched.

use quire_value::{FunctionValue, TypedMap, TypedValue, ValueError, ValueResult};

pub const LIBRARY_NAME: &str = "lib";

const DEFAULT_FONT_SIZE: f64 = 16.0;
const DEFAULT_WIDTH_FACTOR: f64 = 0.6;
const DEFAULT_LINE_HEIGHT: f64 = 1.2;
const ASCENT: f64 = 0.8;
const DESCENT: f64 = 0.2;

/// Build the `lib` mapping.
pub fn library() -> TypedValue {
    let mut map = TypedMap::new();
    map.insert("textMetrics", function("textMetrics", text_metrics));
    map.insert("translate", function("translate", translate));
    map.insert("rotate", function("rotate", rotate));
    TypedValue::mapping(map)
}

fn function(name: &str, f: fn(&[TypedValue]) -> ValueResult<TypedValue>) -> TypedValue {
    TypedValue::Function(FunctionValue::from_fn(name, f))
}

fn number(args: &[TypedValue], index: usize, what: &str) -> ValueResult<f64> {
    match args.get(index) {
        Some(value @ (TypedValue::Integer(_) | TypedValue::Float(_))) => Ok(value.as_f64().unwrap_or(0.0)),
        Some(other) => Err(ValueError::runtime(format!("{what} must be a number, got {}", other.type_name()))),
        None => Err(ValueError::runtime(format!("missing argument: {what}"))),
    }
}

fn option(options: Option<&TypedValue>, key: &str, default: f64) -> f64 {
    options
        .and_then(TypedValue::as_mapping)
        .and_then(|map| map.get(key))
        .and_then(|value| value.as_f64())
        .unwrap_or(default)
}

/// Estimate the box of `text` set at `fontSize` (default 16). Widths
/// assume a uniform advance of `widthFactor` ems per character.
fn text_metrics(args: &[TypedValue]) -> ValueResult<TypedValue> {
    let text = match args.first() {
        None | Some(TypedValue::Null) => String::new(),
        Some(TypedValue::String(s)) => s.to_string(),
        Some(other) => other.to_string(),
    };
    let size = match args.get(1) {
        None | Some(TypedValue::Null) => DEFAULT_FONT_SIZE,
        Some(_) => number(args, 1, "fontSize")?,
    };
    let options = args.get(2);
    let width_factor = option(options, "widthFactor", DEFAULT_WIDTH_FACTOR);
    let line_height = option(options, "lineHeight", DEFAULT_LINE_HEIGHT);

    let lines: Vec<&str> = text.split('\n').collect();
    let longest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);

    let mut metrics = TypedMap::new();
    metrics.insert("width", TypedValue::Float(longest as f64 * size * width_factor));
    metrics.insert("height", TypedValue::Float(lines.len() as f64 * size * line_height));
    metrics.insert("ascent", TypedValue::Float(size * ASCENT));
    metrics.insert("descent", TypedValue::Float(size * DESCENT));
    metrics.insert("lines", TypedValue::Integer(lines.len() as i64));
    Ok(TypedValue::mapping(metrics))
}

fn translate(args: &[TypedValue]) -> ValueResult<TypedValue> {
    let shape = args.first().cloned().unwrap_or(TypedValue::Null);
    let dx = args.get(1).cloned().unwrap_or(TypedValue::Integer(0));
    let dy = args.get(2).cloned().unwrap_or(TypedValue::Integer(0));
    number(&[dx.clone()], 0, "dx")?;
    number(&[dy.clone()], 0, "dy")?;
    Ok(map_points(&shape, &|x: &TypedValue, y: &TypedValue| (add(x, &dx), add(y, &dy))))
}

fn add(a: &TypedValue, b: &TypedValue) -> TypedValue {
    match (a, b) {
        (TypedValue::Integer(a), TypedValue::Integer(b)) => match a.checked_add(*b) {
            Some(sum) => TypedValue::Integer(sum),
            None => TypedValue::Float(*a as f64 + *b as f64),
        },
        _ => TypedValue::Float(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0)),
    }
}

/// Rotate about the origin by an angle in radians.
fn rotate(args: &[TypedValue]) -> ValueResult<TypedValue> {
    let shape = args.first().cloned().unwrap_or(TypedValue::Null);
    let angle = number(args, 1, "angle")?;
    let (sin, cos) = angle.sin_cos();
    Ok(map_points(&shape, &|x: &TypedValue, y: &TypedValue| {
        let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
        (TypedValue::Float(x * cos - y * sin), TypedValue::Float(x * sin + y * cos))
    }))
}

fn is_number(value: &TypedValue) -> bool {
    matches!(value, TypedValue::Integer(_) | TypedValue::Float(_))
}

fn map_points(value: &TypedValue, f: &dyn Fn(&TypedValue, &TypedValue) -> (TypedValue, TypedValue)) -> TypedValue {
    match value {
        TypedValue::List(list) => TypedValue::list(list.items().iter().map(|item| map_points(item, f)).collect()),
        TypedValue::Mapping(map) => {
            let point = match (map.get("x"), map.get("y")) {
                (Some(x), Some(y)) if is_number(&x) && is_number(&y) => Some(f(&x, &y)),
                _ => None,
            };
            let mut out = TypedMap::new();
            for (key, entry) in map.iter() {
                let rewritten = match (&point, key.to_lowercase().as_str()) {
                    (Some((x, _)), "x") => x.clone(),
                    (Some((_, y)), "y") => y.clone(),
                    _ => map_points(&entry, f),
                };
                out.insert(key, rewritten);
            }
            TypedValue::mapping(out)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[TypedValue]) -> TypedValue {
        let lib = library();
        let func = lib.as_mapping().and_then(|m| m.get(name)).unwrap();
        func.as_function().unwrap().call(args).unwrap()
    }

    fn point(x: TypedValue, y: TypedValue) -> TypedValue {
        TypedValue::mapping([("x", x), ("y", y)].into_iter().collect())
    }

    #[test]
    fn test_text_metrics_defaults() {
        let metrics = call("textMetrics", &[TypedValue::from("abcd\nab")]);
        let m = metrics.as_mapping().unwrap();
        assert_eq!(m.get("width").and_then(|v| v.as_f64()), Some(4.0 * 16.0 * 0.6));
        assert_eq!(m.get("height").and_then(|v| v.as_f64()), Some(2.0 * 16.0 * 1.2));
        assert_eq!(m.get("ascent").and_then(|v| v.as_f64()), Some(12.8));
        assert_eq!(m.get("lines").and_then(|v| v.as_i64()), Some(2));
    }

    #[test]
    fn test_translate_keeps_integers_and_other_fields() {
        let mut shape = TypedMap::new();
        shape.insert("kind", TypedValue::from("line"));
        shape.insert(
            "points",
            TypedValue::list(vec![
                point(TypedValue::Integer(1), TypedValue::Integer(2)),
                point(TypedValue::Float(0.5), TypedValue::Integer(0)),
            ]),
        );
        let moved = call(
            "translate",
            &[TypedValue::mapping(shape), TypedValue::Integer(10), TypedValue::Integer(20)],
        );
        assert_eq!(moved.to_string(), "{ kind: \"line\", points: [{ x: 11, y: 22 }, { x: 10.5, y: 20 }] }");
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let rotated = call(
            "rotate",
            &[point(TypedValue::Integer(1), TypedValue::Integer(0)), TypedValue::Float(std::f64::consts::FRAC_PI_2)],
        );
        let m = rotated.as_mapping().unwrap();
        let x = m.get("x").and_then(|v| v.as_f64()).unwrap();
        let y = m.get("y").and_then(|v| v.as_f64()).unwrap();
        assert!(x.abs() < 1e-12);
        assert!((y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_numeric_offset_fails() {
        let lib = library();
        let func = lib.as_mapping().and_then(|m| m.get("translate")).unwrap();
        let err = func
            .as_function()
            .unwrap()
            .call(&[TypedValue::Null, TypedValue::from("a")])
            .unwrap_err();
        assert_eq!(err.to_string(), "dx must be a number, got string");
    }
}
