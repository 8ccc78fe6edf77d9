//! Formula evaluator: walks a formula AST and produces a [`TypedValue`].

use std::cell::Cell;
use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};
use quire_types::ast::formula::*;
use quire_types::ErrorKind;
use quire_value::{ErrorValue, FunctionValue, TypedCallable, TypedValue, ValueResult};

use crate::env::Environment;
use crate::error::{EvalError, EvalResult};
use crate::methods;

/// Default cap on nested lambda calls.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 256;

/// Resolves identifiers that are not bound locally.
pub trait FormulaScope {
    /// `Ok(None)` means the name is not defined anywhere.
    fn lookup(&self, name: &str) -> EvalResult<Option<TypedValue>>;
}

/// State shared by one formula evaluation and every lambda it creates.
pub struct FormulaContext {
    scope: Rc<dyn FormulaScope>,
    depth: Cell<u32>,
    max_depth: u32,
}

impl FormulaContext {
    pub fn new(scope: Rc<dyn FormulaScope>) -> Rc<Self> {
        Self::with_max_depth(scope, DEFAULT_MAX_CALL_DEPTH)
    }

    pub fn with_max_depth(scope: Rc<dyn FormulaScope>, max_depth: u32) -> Rc<Self> {
        Rc::new(Self {
            scope,
            depth: Cell::new(0),
            max_depth,
        })
    }

    fn enter(&self) -> EvalResult<DepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(EvalError::StackOverflow);
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }
}

struct DepthGuard<'a>(&'a Cell<u32>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// Evaluate a formula expression against `ctx`'s scope.
pub fn evaluate(expr: &Expr, ctx: &Rc<FormulaContext>) -> EvalResult<TypedValue> {
    Evaluator { ctx: ctx.clone() }.eval(expr, &Environment::new())
}

/// A lambda closed over its defining environment.
struct Closure {
    lambda: Rc<Lambda>,
    env: Environment,
    ctx: Rc<FormulaContext>,
}

impl TypedCallable for Closure {
    fn name(&self) -> &str {
        "lambda"
    }

    fn call(&self, args: &[TypedValue]) -> ValueResult<TypedValue> {
        let _guard = self.ctx.enter()?;
        let mut env = self.env.clone();
        for (i, param) in self.lambda.params.iter().enumerate() {
            let arg = args.get(i).cloned().unwrap_or(TypedValue::Null);
            env = env.bind(&param.name, arg);
        }
        let evaluator = Evaluator {
            ctx: self.ctx.clone(),
        };
        Ok(evaluator.eval(&self.lambda.body, &env)?)
    }
}

/// The tree walker. Holds no per-node state; locals travel as an
/// [`Environment`] argument so lambdas can capture them.
pub(crate) struct Evaluator {
    ctx: Rc<FormulaContext>,
}

impl Evaluator {
    // ══════════════════════════════════════════════════════════════════════
    // Expression evaluation
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn eval(&self, expr: &Expr, env: &Environment) -> EvalResult<TypedValue> {
        match &expr.kind {
            ExprKind::Null => Ok(TypedValue::Null),
            ExprKind::Bool(b) => Ok(TypedValue::Boolean(*b)),
            ExprKind::Integer(i) => Ok(TypedValue::Integer(*i)),
            ExprKind::BigInteger(digits) => {
                let n: BigInt = digits.parse().map_err(|_| {
                    EvalError::runtime(format!("invalid integer literal '{digits}'"))
                })?;
                Ok(TypedValue::from_bigint(n))
            }
            ExprKind::Float(x) => Ok(TypedValue::Float(*x)),
            ExprKind::String(s) => Ok(TypedValue::string(s)),

            ExprKind::Interpolation(parts) => self.eval_interpolation(parts, env),
            ExprKind::List(items) => self.eval_list(items, env),
            ExprKind::Record(entries) => self.eval_record(entries, env),

            ExprKind::Identifier(name) => self.eval_identifier(name, env),
            ExprKind::Member { object, name } => {
                let obj = self.eval(object, env)?;
                methods::member(&obj, &name.name)
            }
            ExprKind::Index { object, index } => {
                let obj = self.eval(object, env)?;
                let idx = self.eval(index, env)?;
                index_value(&obj, &idx)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, env),

            ExprKind::Binary { left, op, right } => self.eval_binary(left, *op, right, env),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, env),
            ExprKind::Coalesce { left, right } => {
                let lv = self.eval(left, env)?;
                if lv.is_null() {
                    self.eval(right, env)
                } else {
                    Ok(lv)
                }
            }

            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.eval(condition, env)?;
                if condition_value(&cond, "if")? {
                    self.eval(then_branch, env)
                } else {
                    self.eval(else_branch, env)
                }
            }
            ExprKind::Let { name, value, body } => {
                let bound = self.eval(value, env)?;
                self.eval(body, &env.bind(&name.name, bound))
            }
            ExprKind::Lambda(lambda) => Ok(TypedValue::Function(FunctionValue::new(Closure {
                lambda: lambda.clone(),
                env: env.clone(),
                ctx: self.ctx.clone(),
            }))),
            ExprKind::Paren(inner) => self.eval(inner, env),
        }
    }

    // ── Literals ──────────────────────────────────────────────────────────

    fn eval_interpolation(&self, parts: &[StringPart], env: &Environment) -> EvalResult<TypedValue> {
        let mut result = String::new();
        for part in parts {
            match part {
                StringPart::Literal(s) => result.push_str(s),
                StringPart::Expr(expr) => {
                    let val = self.eval(expr, env)?;
                    result.push_str(&val.to_string());
                }
            }
        }
        Ok(TypedValue::string(result))
    }

    fn eval_list(&self, items: &[ListItem], env: &Environment) -> EvalResult<TypedValue> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ListItem::Item(expr) => values.push(self.eval(expr, env)?),
                ListItem::Spread(expr) => match self.eval(expr, env)? {
                    TypedValue::List(list) => values.extend(list.items().iter().cloned()),
                    TypedValue::Null => {}
                    other => {
                        return Err(EvalError::type_mismatch(format!(
                            "spread in a list requires a list, got {}",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(TypedValue::list(values))
    }

    fn eval_record(&self, entries: &[RecordEntry], env: &Environment) -> EvalResult<TypedValue> {
        let mut map = quire_value::TypedMap::new();
        for entry in entries {
            match entry {
                RecordEntry::Field { key, value } => {
                    let val = self.eval(value, env)?;
                    map.set(key.name.clone(), val);
                }
                RecordEntry::Spread(expr) => match self.eval(expr, env)? {
                    TypedValue::Mapping(source) => {
                        for (key, val) in source.iter() {
                            map.set(key, val);
                        }
                    }
                    TypedValue::Null => {}
                    other => {
                        return Err(EvalError::type_mismatch(format!(
                            "spread in a record requires a mapping, got {}",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(TypedValue::mapping(map))
    }

    // ── Identifiers & Calls ──────────────────────────────────────────────

    fn eval_identifier(&self, name: &str, env: &Environment) -> EvalResult<TypedValue> {
        if let Some(value) = env.get(name) {
            return Ok(value.clone());
        }
        self.ctx
            .scope
            .lookup(name)?
            .ok_or_else(|| EvalError::UndefinedVariable(name.to_string()))
    }

    fn eval_call(&self, callee: &Expr, args: &[Expr], env: &Environment) -> EvalResult<TypedValue> {
        let func = self.eval(callee, env)?;
        let mut arg_vals = Vec::with_capacity(args.len());
        for arg in args {
            arg_vals.push(self.eval(arg, env)?);
        }
        match func {
            TypedValue::Function(f) => Ok(f.call(&arg_vals)?),
            TypedValue::Null => Err(EvalError::type_mismatch(format!(
                "{} is null and cannot be called",
                describe_callee(callee)
            ))),
            other => Err(EvalError::type_mismatch(format!(
                "{} is a {}, not a function",
                describe_callee(callee),
                other.type_name()
            ))),
        }
    }

    // ── Operators ────────────────────────────────────────────────────────

    fn eval_binary(
        &self,
        left: &Expr,
        op: BinOp,
        right: &Expr,
        env: &Environment,
    ) -> EvalResult<TypedValue> {
        // Short-circuit for logical operators
        if op == BinOp::And {
            let lv = self.eval(left, env)?;
            if !condition_value(&lv, "and")? {
                return Ok(TypedValue::Boolean(false));
            }
            let rv = self.eval(right, env)?;
            return Ok(TypedValue::Boolean(condition_value(&rv, "and")?));
        }
        if op == BinOp::Or {
            let lv = self.eval(left, env)?;
            if condition_value(&lv, "or")? {
                return Ok(TypedValue::Boolean(true));
            }
            let rv = self.eval(right, env)?;
            return Ok(TypedValue::Boolean(condition_value(&rv, "or")?));
        }

        let lv = self.eval(left, env)?;
        let rv = self.eval(right, env)?;

        match op {
            BinOp::Add => add(&lv, &rv),
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, &lv, &rv),
            BinOp::Eq => Ok(TypedValue::Boolean(values_equal(&lv, &rv))),
            BinOp::NotEq => Ok(TypedValue::Boolean(!values_equal(&lv, &rv))),
            BinOp::Less | BinOp::Greater | BinOp::LessEq | BinOp::GreaterEq => {
                let ordering = compare(&lv, &rv).ok_or_else(|| {
                    EvalError::type_mismatch(format!(
                        "cannot compare {} and {} with '{}'",
                        lv.type_name(),
                        rv.type_name(),
                        op.symbol()
                    ))
                })?;
                let result = match op {
                    BinOp::Less => ordering == Ordering::Less,
                    BinOp::Greater => ordering == Ordering::Greater,
                    BinOp::LessEq => ordering != Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(TypedValue::Boolean(result))
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn eval_unary(&self, op: UnaryOp, operand: &Expr, env: &Environment) -> EvalResult<TypedValue> {
        let val = self.eval(operand, env)?;
        match op {
            UnaryOp::Neg => match val {
                TypedValue::Integer(i) => Ok(i
                    .checked_neg()
                    .map(TypedValue::Integer)
                    .unwrap_or_else(|| TypedValue::from_bigint(-BigInt::from(i)))),
                TypedValue::BigInt(n) => Ok(TypedValue::from_bigint(-(*n).clone())),
                TypedValue::Float(x) => Ok(TypedValue::Float(-x)),
                other => Err(EvalError::type_mismatch(format!(
                    "cannot negate {}",
                    other.type_name()
                ))),
            },
            UnaryOp::Not => Ok(TypedValue::Boolean(!condition_value(&val, "not")?)),
        }
    }
}

/// Name a callee for error messages.
fn describe_callee(callee: &Expr) -> String {
    match &callee.kind {
        ExprKind::Identifier(name) => format!("'{name}'"),
        ExprKind::Member { name, .. } => format!("'{}'", name.name),
        _ => "expression".to_string(),
    }
}

/// Logical operands must be booleans; `null` counts as false.
fn condition_value(value: &TypedValue, context: &str) -> EvalResult<bool> {
    match value {
        TypedValue::Boolean(b) => Ok(*b),
        TypedValue::Null => Ok(false),
        TypedValue::Error(err) => Err(raise(context, err)),
        other => Err(EvalError::type_mismatch(format!(
            "'{context}' expects a boolean, got {}",
            other.type_name()
        ))),
    }
}

/// Turn an error-tag value that a formula tried to read into a failure.
pub(crate) fn raise(name: &str, err: &ErrorValue) -> EvalError {
    if err.kind == ErrorKind::Engine.as_str() {
        EvalError::Engine(err.message.clone())
    } else {
        EvalError::Dependency {
            name: name.to_string(),
            message: err.message.clone(),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════
// Indexing
// ══════════════════════════════════════════════════════════════════════

fn index_value(object: &TypedValue, index: &TypedValue) -> EvalResult<TypedValue> {
    match (object, index) {
        (TypedValue::Null, _) => Err(EvalError::NullAccess(format!("[{index}]"))),
        (TypedValue::Error(err), _) => Err(raise(&format!("[{index}]"), err)),
        (TypedValue::Mapping(map), TypedValue::String(key)) => methods::mapping_get(map, key),
        (TypedValue::Mapping(map), TypedValue::Integer(i)) => {
            methods::mapping_get(map, &i.to_string())
        }
        (_, TypedValue::Integer(_) | TypedValue::Float(_)) => {
            let Some(position) = list_position(index)? else {
                return Ok(TypedValue::Null);
            };
            match object {
                TypedValue::List(list) => Ok(list.get(position).cloned().unwrap_or(TypedValue::Null)),
                TypedValue::String(s) => Ok(s
                    .chars()
                    .nth(position)
                    .map(|c| TypedValue::string(c.to_string()))
                    .unwrap_or(TypedValue::Null)),
                TypedValue::Bytes(bytes) => Ok(bytes
                    .get(position)
                    .map(|b| TypedValue::Integer(i64::from(*b)))
                    .unwrap_or(TypedValue::Null)),
                other => Err(EvalError::type_mismatch(format!(
                    "cannot index {} with a number",
                    other.type_name()
                ))),
            }
        }
        _ => Err(EvalError::type_mismatch(format!(
            "cannot index {} with {}",
            object.type_name(),
            index.type_name()
        ))),
    }
}

/// A non-negative list position; negative indexes are out of range.
fn list_position(index: &TypedValue) -> EvalResult<Option<usize>> {
    match index {
        TypedValue::Integer(i) => Ok(usize::try_from(*i).ok()),
        TypedValue::Float(x) if x.fract() == 0.0 => Ok(if *x >= 0.0 {
            x.to_usize()
        } else {
            None
        }),
        other => Err(EvalError::type_mismatch(format!(
            "index must be an integer, got {other}"
        ))),
    }
}

// ══════════════════════════════════════════════════════════════════════
// Arithmetic
// ══════════════════════════════════════════════════════════════════════

fn add(lv: &TypedValue, rv: &TypedValue) -> EvalResult<TypedValue> {
    match (lv, rv) {
        (TypedValue::String(a), TypedValue::String(b)) => Ok(TypedValue::string(format!("{a}{b}"))),
        (TypedValue::String(a), other) if !matches!(other, TypedValue::Error(_)) => {
            Ok(TypedValue::string(format!("{a}{other}")))
        }
        (other, TypedValue::String(b)) if !matches!(other, TypedValue::Error(_)) => {
            Ok(TypedValue::string(format!("{other}{b}")))
        }
        _ => arithmetic(BinOp::Add, lv, rv),
    }
}

fn arithmetic(op: BinOp, lv: &TypedValue, rv: &TypedValue) -> EvalResult<TypedValue> {
    match (lv, rv) {
        (TypedValue::Integer(a), TypedValue::Integer(b)) => integer_op(op, *a, *b),
        (
            TypedValue::Integer(_) | TypedValue::BigInt(_),
            TypedValue::Integer(_) | TypedValue::BigInt(_),
        ) => bigint_op(op, to_bigint(lv), to_bigint(rv)),
        _ => match (lv.as_f64(), rv.as_f64()) {
            (Some(a), Some(b)) => float_op(op, a, b),
            _ => Err(EvalError::type_mismatch(format!(
                "cannot apply '{}' to {} and {}",
                op.symbol(),
                lv.type_name(),
                rv.type_name()
            ))),
        },
    }
}

fn to_bigint(value: &TypedValue) -> BigInt {
    match value {
        TypedValue::Integer(i) => BigInt::from(*i),
        TypedValue::BigInt(n) => (**n).clone(),
        _ => BigInt::zero(),
    }
}

fn integer_op(op: BinOp, a: i64, b: i64) -> EvalResult<TypedValue> {
    let checked = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div => {
            if b == 0 {
                return Err(division_by_zero());
            }
            match a.checked_rem(b) {
                Some(0) => a.checked_div(b),
                Some(_) => return float_op(op, a as f64, b as f64),
                None => None,
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(division_by_zero());
            }
            a.checked_rem(b)
        }
        _ => None,
    };
    match checked {
        Some(v) => Ok(TypedValue::Integer(v)),
        // Overflow: redo the operation with arbitrary precision
        None => bigint_op(op, BigInt::from(a), BigInt::from(b)),
    }
}

fn bigint_op(op: BinOp, a: BigInt, b: BigInt) -> EvalResult<TypedValue> {
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b.is_zero() {
                return Err(division_by_zero());
            }
            if !(&a % &b).is_zero() {
                let (x, y) = (a.to_f64().unwrap_or(f64::NAN), b.to_f64().unwrap_or(f64::NAN));
                return float_op(op, x, y);
            }
            a / b
        }
        BinOp::Mod => {
            if b.is_zero() {
                return Err(division_by_zero());
            }
            a % b
        }
        _ => {
            return Err(EvalError::type_mismatch(format!(
                "'{}' is not an arithmetic operator",
                op.symbol()
            )))
        }
    };
    Ok(TypedValue::from_bigint(result))
}

fn float_op(op: BinOp, a: f64, b: f64) -> EvalResult<TypedValue> {
    if matches!(op, BinOp::Div | BinOp::Mod) && b == 0.0 {
        return Err(division_by_zero());
    }
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => a % b,
        _ => f64::NAN,
    };
    if !result.is_finite() {
        return Err(EvalError::Arithmetic(format!(
            "'{}' produced a non-finite result",
            op.symbol()
        )));
    }
    Ok(TypedValue::Float(result))
}

fn division_by_zero() -> EvalError {
    EvalError::Arithmetic("division by zero".into())
}

// ══════════════════════════════════════════════════════════════════════
// Equality & ordering
// ══════════════════════════════════════════════════════════════════════

/// Structural equality. Numbers compare by value across tags.
pub(crate) fn values_equal(a: &TypedValue, b: &TypedValue) -> bool {
    match (a, b) {
        (TypedValue::Null, TypedValue::Null) => true,
        (TypedValue::Boolean(x), TypedValue::Boolean(y)) => x == y,
        (
            TypedValue::Integer(_) | TypedValue::BigInt(_),
            TypedValue::Integer(_) | TypedValue::BigInt(_),
        ) => to_bigint(a) == to_bigint(b),
        (TypedValue::String(x), TypedValue::String(y)) => x == y,
        (TypedValue::DateTime(x), TypedValue::DateTime(y)) => x == y,
        (TypedValue::Bytes(x), TypedValue::Bytes(y)) => x == y,
        (TypedValue::List(x), TypedValue::List(y)) => {
            x.len() == y.len()
                && x.items().iter().zip(y.items()).all(|(p, q)| values_equal(p, q))
        }
        (TypedValue::Mapping(x), TypedValue::Mapping(y)) => {
            x.len() == y.len()
                && x.iter().all(|(key, value)| {
                    y.get(key).is_some_and(|other| values_equal(&value, &other))
                })
        }
        (TypedValue::Function(x), TypedValue::Function(y)) => x.ptr_eq(y),
        (TypedValue::Error(x), TypedValue::Error(y)) => x.kind == y.kind && x.message == y.message,
        (TypedValue::Signal(x), TypedValue::Signal(y)) => x == y,
        (
            TypedValue::Integer(_) | TypedValue::Float(_) | TypedValue::BigInt(_),
            TypedValue::Integer(_) | TypedValue::Float(_) | TypedValue::BigInt(_),
        ) => a.as_f64() == b.as_f64(),
        _ => false,
    }
}

/// Ordering for `<`-style comparisons; `None` when the operands are not
/// comparable.
pub(crate) fn compare(a: &TypedValue, b: &TypedValue) -> Option<Ordering> {
    match (a, b) {
        (TypedValue::Integer(x), TypedValue::Integer(y)) => Some(x.cmp(y)),
        (
            TypedValue::Integer(_) | TypedValue::BigInt(_),
            TypedValue::Integer(_) | TypedValue::BigInt(_),
        ) => Some(to_bigint(a).cmp(&to_bigint(b))),
        (TypedValue::String(x), TypedValue::String(y)) => Some(x.cmp(y)),
        (TypedValue::DateTime(x), TypedValue::DateTime(y)) => Some(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_overflow_promotes() {
        let result = integer_op(BinOp::Mul, i64::MAX, 2).unwrap();
        assert!(matches!(result, TypedValue::BigInt(_)));
        assert_eq!(result.to_string(), "18446744073709551614");
    }

    #[test]
    fn test_bigint_result_demotes_when_it_fits() {
        let big = bigint_op(BinOp::Mul, BigInt::from(i64::MAX), BigInt::from(2)).unwrap();
        let back = arithmetic(BinOp::Div, &big, &TypedValue::Integer(2)).unwrap();
        assert_eq!(back.as_i64(), Some(i64::MAX));
    }

    #[test]
    fn test_min_div_minus_one_does_not_trap() {
        let result = integer_op(BinOp::Div, i64::MIN, -1).unwrap();
        assert_eq!(result.to_string(), "9223372036854775808");
    }

    #[test]
    fn test_inexact_division_yields_float() {
        let result = integer_op(BinOp::Div, 7, 2).unwrap();
        assert!(matches!(result, TypedValue::Float(x) if x == 3.5));
        assert_eq!(integer_op(BinOp::Div, 6, 3).unwrap().as_i64(), Some(2));
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(
            compare(&TypedValue::Integer(1), &TypedValue::Float(1.5)),
            Some(Ordering::Less)
        );
        assert!(values_equal(&TypedValue::Integer(2), &TypedValue::Float(2.0)));
        assert_eq!(compare(&TypedValue::Integer(1), &TypedValue::string("a")), None);
    }
}
