//! The `math` mapping available to formulas at the root scope.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive};
use quire_value::{FunctionValue, TypedMap, TypedValue, ValueError, ValueResult};

use crate::evaluator::compare;

/// Build the `math` mapping.
pub fn module() -> TypedValue {
    let mut map = TypedMap::new();
    map.insert("pi", TypedValue::Float(std::f64::consts::PI));
    map.insert("e", TypedValue::Float(std::f64::consts::E));
    map.insert("tau", TypedValue::Float(std::f64::consts::TAU));

    map.insert("abs", function("abs", abs));
    map.insert("floor", function("floor", |args| rounding(args, "floor", f64::floor)));
    map.insert("ceil", function("ceil", |args| rounding(args, "ceil", f64::ceil)));
    map.insert("round", function("round", |args| rounding(args, "round", f64::round)));
    map.insert("trunc", function("trunc", |args| rounding(args, "trunc", f64::trunc)));
    map.insert("min", function("min", |args| extreme(args, "min", std::cmp::Ordering::Less)));
    map.insert("max", function("max", |args| extreme(args, "max", std::cmp::Ordering::Greater)));
    map.insert("clamp", function("clamp", clamp));
    map.insert("pow", function("pow", pow));

    for &(name, f) in UNARY {
        map.insert(name, function(name, move |args| float_result(name, f(number(args, 0, name)?))));
    }
    map.insert(
        "atan2",
        function("atan2", |args| {
            float_result("atan2", number(args, 0, "atan2")?.atan2(number(args, 1, "atan2")?))
        }),
    );
    map.insert(
        "hypot",
        function("hypot", |args| {
            float_result("hypot", number(args, 0, "hypot")?.hypot(number(args, 1, "hypot")?))
        }),
    );
    TypedValue::mapping(map)
}

const UNARY: &[(&str, fn(f64) -> f64)] = &[
    ("sqrt", f64::sqrt),
    ("sin", f64::sin),
    ("cos", f64::cos),
    ("tan", f64::tan),
    ("asin", f64::asin),
    ("acos", f64::acos),
    ("atan", f64::atan),
    ("exp", f64::exp),
    ("log", f64::ln),
];

fn function<F>(name: &str, f: F) -> TypedValue
where
    F: Fn(&[TypedValue]) -> ValueResult<TypedValue> + 'static,
{
    TypedValue::Function(FunctionValue::from_fn(format!("math.{name}"), f))
}

fn number(args: &[TypedValue], i: usize, name: &str) -> ValueResult<f64> {
    args.get(i).and_then(TypedValue::as_f64).ok_or_else(|| {
        ValueError::runtime(format!("math.{name} expects a number as argument {}", i + 1))
    })
}

fn numeric_arg<'a>(args: &'a [TypedValue], i: usize, name: &str) -> ValueResult<&'a TypedValue> {
    match args.get(i) {
        Some(v @ (TypedValue::Integer(_) | TypedValue::Float(_) | TypedValue::BigInt(_))) => Ok(v),
        _ => Err(ValueError::runtime(format!(
            "math.{name} expects a number as argument {}",
            i + 1
        ))),
    }
}

fn float_result(name: &str, x: f64) -> ValueResult<TypedValue> {
    if x.is_finite() {
        Ok(TypedValue::Float(x))
    } else {
        Err(ValueError::runtime(format!("math.{name} produced a non-finite result")))
    }
}

/// An integral double as an integer tag.
fn integral(x: f64) -> TypedValue {
    match x.to_i64() {
        Some(i) => TypedValue::Integer(i),
        None => BigInt::from_f64(x).map_or(TypedValue::Float(x), TypedValue::from_bigint),
    }
}

fn abs(args: &[TypedValue]) -> ValueResult<TypedValue> {
    match numeric_arg(args, 0, "abs")? {
        TypedValue::Integer(i) => Ok(i
            .checked_abs()
            .map(TypedValue::Integer)
            .unwrap_or_else(|| TypedValue::from_bigint(BigInt::from(*i).abs()))),
        TypedValue::BigInt(n) => Ok(TypedValue::from_bigint(n.abs())),
        other => float_result("abs", other.as_f64().unwrap_or(f64::NAN).abs()),
    }
}

fn rounding(args: &[TypedValue], name: &str, f: fn(f64) -> f64) -> ValueResult<TypedValue> {
    match numeric_arg(args, 0, name)? {
        TypedValue::Float(x) => {
            let rounded = f(*x);
            if rounded.is_finite() {
                Ok(integral(rounded))
            } else {
                float_result(name, rounded)
            }
        }
        integer => Ok(integer.clone()),
    }
}

/// `min`/`max` over arguments, or over a single list argument.
fn extreme(args: &[TypedValue], name: &str, wanted: std::cmp::Ordering) -> ValueResult<TypedValue> {
    let items = match args {
        [TypedValue::List(list)] => list.items(),
        _ => args,
    };
    let mut best: Option<&TypedValue> = None;
    for (i, item) in items.iter().enumerate() {
        numeric_arg(items, i, name)?;
        best = match best {
            Some(current) if compare(item, current) != Some(wanted) => Some(current),
            _ => Some(item),
        };
    }
    best.cloned()
        .ok_or_else(|| ValueError::runtime(format!("math.{name} expects at least one number")))
}

fn clamp(args: &[TypedValue]) -> ValueResult<TypedValue> {
    let value = numeric_arg(args, 0, "clamp")?;
    let lo = numeric_arg(args, 1, "clamp")?;
    let hi = numeric_arg(args, 2, "clamp")?;
    if compare(value, lo) == Some(std::cmp::Ordering::Less) {
        Ok(lo.clone())
    } else if compare(value, hi) == Some(std::cmp::Ordering::Greater) {
        Ok(hi.clone())
    } else {
        Ok(value.clone())
    }
}

const MAX_EXACT_EXPONENT: i64 = 4096;

/// Integer powers stay exact; everything else is a float.
fn pow(args: &[TypedValue]) -> ValueResult<TypedValue> {
    let base = numeric_arg(args, 0, "pow")?;
    let exponent = numeric_arg(args, 1, "pow")?;
    match (base, exponent) {
        (TypedValue::Integer(b), TypedValue::Integer(e)) if (0..=MAX_EXACT_EXPONENT).contains(e) => {
            let exp = *e as u32;
            match b.checked_pow(exp) {
                Some(v) => Ok(TypedValue::Integer(v)),
                None => Ok(TypedValue::from_bigint(BigInt::from(*b).pow(exp))),
            }
        }
        _ => float_result(
            "pow",
            base.as_f64()
                .unwrap_or(f64::NAN)
                .powf(exponent.as_f64().unwrap_or(f64::NAN)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[TypedValue]) -> ValueResult<TypedValue> {
        let math = module();
        let f = math.as_mapping().unwrap().get(name).unwrap();
        f.as_function().unwrap().call(args)
    }

    #[test]
    fn test_rounding_produces_integers() {
        assert_eq!(call("floor", &[TypedValue::Float(2.7)]).unwrap().as_i64(), Some(2));
        assert_eq!(call("round", &[TypedValue::Float(-1.5)]).unwrap().as_i64(), Some(-2));
        assert_eq!(call("ceil", &[TypedValue::Integer(4)]).unwrap().as_i64(), Some(4));
    }

    #[test]
    fn test_min_max_keep_original_tags() {
        let args = [TypedValue::Integer(3), TypedValue::Float(1.5), TypedValue::Integer(9)];
        assert!(matches!(call("min", &args).unwrap(), TypedValue::Float(x) if x == 1.5));
        assert_eq!(call("max", &args).unwrap().as_i64(), Some(9));
        let list = TypedValue::list(vec![TypedValue::Integer(4), TypedValue::Integer(2)]);
        assert_eq!(call("min", &[list]).unwrap().as_i64(), Some(2));
    }

    #[test]
    fn test_integer_pow_is_exact() {
        let big = call("pow", &[TypedValue::Integer(2), TypedValue::Integer(70)]).unwrap();
        assert_eq!(big.to_string(), "1180591620717411303424");
        let root = call("pow", &[TypedValue::Integer(4), TypedValue::Float(0.5)]).unwrap();
        assert_eq!(root.as_f64(), Some(2.0));
    }

    #[test]
    fn test_non_finite_results_fail() {
        let err = call("sqrt", &[TypedValue::Integer(-1)]).unwrap_err();
        assert_eq!(err.to_string(), "math.sqrt produced a non-finite result");
    }

    #[test]
    fn test_clamp() {
        let args = [TypedValue::Integer(12), TypedValue::Integer(0), TypedValue::Integer(10)];
        assert_eq!(call("clamp", &args).unwrap().as_i64(), Some(10));
    }
}
