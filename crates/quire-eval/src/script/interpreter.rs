//! Statement and expression execution for scripts.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use indexmap::IndexMap;
use quire_types::ast::script::*;
use quire_value::{Callable, NativeFunction, NativeValue, ValueError, ValueResult};

use super::builtins::object_entries;
use super::ops;
use super::scope::Scope;
use super::HostScope;
use crate::error::{EvalError, ScriptError};

pub(crate) type Exec<T> = Result<T, ScriptError>;

/// How a statement finished.
pub(crate) enum Flow {
    Normal,
    Return(NativeValue),
    Break,
    Continue,
}

/// One script execution: the host scope it reads through and the call
/// depth counter shared by every function it creates.
pub(crate) struct Interpreter {
    host: Rc<dyn HostScope>,
    depth: Cell<u32>,
    max_depth: u32,
}

struct DepthGuard<'a>(&'a Cell<u32>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

/// A script function closed over its defining scope.
pub(crate) struct ScriptFunction {
    func: Rc<Function>,
    scope: Scope,
    runtime: Rc<Interpreter>,
    name: String,
}

impl ScriptFunction {
    pub(crate) fn invoke(&self, args: &[NativeValue]) -> Exec<NativeValue> {
        self.runtime.call_function(self, args)
    }
}

impl Callable for ScriptFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, args: &[NativeValue]) -> ValueResult<NativeValue> {
        self.invoke(args).map_err(ValueError::from)
    }

    fn as_any(&self) -> Option<&dyn Any> {
        Some(self)
    }
}

/// A resolved assignment target.
enum Target {
    Variable(String),
    Property(NativeValue, String),
}

impl Interpreter {
    pub(crate) fn new(host: Rc<dyn HostScope>, max_depth: u32) -> Rc<Self> {
        Rc::new(Self {
            host,
            depth: Cell::new(0),
            max_depth,
        })
    }

    /// Run a script body as the function `name`. `return` yields the
    /// result; falling off the end yields `null`.
    pub(crate) fn run(self: &Rc<Self>, script: &Script, name: &str) -> Exec<NativeValue> {
        let scope = Scope::root();
        match self.exec_body(&script.body, &scope) {
            Ok(Flow::Return(value)) => Ok(value),
            Ok(_) => Ok(NativeValue::Null),
            Err(mut err) => {
                err.unwind(name);
                Err(err)
            }
        }
    }

    fn enter(&self) -> Exec<DepthGuard<'_>> {
        let depth = self.depth.get();
        if depth >= self.max_depth {
            return Err(EvalError::StackOverflow.into());
        }
        self.depth.set(depth + 1);
        Ok(DepthGuard(&self.depth))
    }

    fn call_function(self: &Rc<Self>, function: &ScriptFunction, args: &[NativeValue]) -> Exec<NativeValue> {
        let _guard = self.enter()?;
        let scope = function.scope.child();
        for (i, param) in function.func.params.iter().enumerate() {
            let arg = args.get(i).cloned().unwrap_or(NativeValue::Undefined);
            scope.define(&param.name, arg);
        }
        let result = match &function.func.body {
            FunctionBody::Block(body) => self.exec_body(body, &scope).map(|flow| match flow {
                Flow::Return(value) => value,
                _ => NativeValue::Undefined,
            }),
            FunctionBody::Expr(expr) => self.eval(expr, &scope).map_err(|mut err| {
                err.locate(expr.span.line, expr.span.col);
                err
            }),
        };
        result.map_err(|mut err| {
            err.unwind(&function.name);
            err
        })
    }

    /// Call any callable value. Script functions run directly so their
    /// frames stay on the stack trace.
    pub(crate) fn call_value(&self, callee: &NativeValue, args: &[NativeValue], what: &str) -> Exec<NativeValue> {
        match callee {
            NativeValue::Function(func) => match func.downcast_ref::<ScriptFunction>() {
                Some(script_fn) => script_fn.invoke(args),
                None => Ok(func.call(args)?),
            },
            _ => Err(EvalError::type_mismatch(format!("{what} is not a function")).into()),
        }
    }

    fn make_function(self: &Rc<Self>, func: &Rc<Function>, scope: &Scope, inferred: Option<&str>) -> NativeValue {
        let name = func
            .name
            .as_ref()
            .map(|ident| ident.name.clone())
            .or_else(|| inferred.map(str::to_string))
            .unwrap_or_else(|| "anonymous".to_string());
        NativeValue::Function(NativeFunction::new(ScriptFunction {
            func: func.clone(),
            scope: scope.clone(),
            runtime: self.clone(),
            name,
        }))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Statements
    // ══════════════════════════════════════════════════════════════════════

    fn exec_body(self: &Rc<Self>, body: &[Stmt], scope: &Scope) -> Exec<Flow> {
        // Function declarations are visible throughout their block
        for stmt in body {
            if let Stmt::Function(func) = stmt {
                if let Some(name) = &func.name {
                    scope.define(&name.name, self.make_function(func, scope, None));
                }
            }
        }
        for stmt in body {
            let flow = self.exec_stmt(stmt, scope).map_err(|mut err| {
                let span = stmt.span();
                err.locate(span.line, span.col);
                err
            })?;
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(self: &Rc<Self>, stmt: &Stmt, scope: &Scope) -> Exec<Flow> {
        match stmt {
            Stmt::Decl { kind, name, init, .. } => {
                let value = match init {
                    Some(expr) => self.eval_named(expr, scope, &name.name)?,
                    None => NativeValue::Undefined,
                };
                scope.declare(&name.name, value, *kind == DeclKind::Const)?;
                Ok(Flow::Normal)
            }
            // Hoisted by the enclosing block
            Stmt::Function(_) => Ok(Flow::Normal),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval(condition, scope)?.is_truthy() {
                    self.exec_stmt(then_branch, scope)
                } else if let Some(else_branch) = else_branch {
                    self.exec_stmt(else_branch, scope)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While { condition, body, .. } => {
                while self.eval(condition, scope)?.is_truthy() {
                    match self.exec_stmt(body, scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                let loop_scope = scope.child();
                if let Some(init) = init {
                    self.exec_stmt(init, &loop_scope)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval(test, &loop_scope)?.is_truthy() {
                            break;
                        }
                    }
                    match self.exec_stmt(body, &loop_scope)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    if let Some(update) = update {
                        self.eval(update, &loop_scope)?;
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
                ..
            } => {
                let iterable = self.eval(iterable, scope)?;
                for item in iterate(&iterable)? {
                    let iteration = scope.child();
                    iteration.declare(&name.name, item, *kind == DeclKind::Const)?;
                    match self.exec_stmt(body, &iteration)? {
                        Flow::Break => break,
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => NativeValue::Undefined,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break(_) => Ok(Flow::Break),
            Stmt::Continue(_) => Ok(Flow::Continue),
            Stmt::Throw { value, .. } => {
                let thrown = self.eval(value, scope)?;
                Err(EvalError::Thrown(ops::thrown_message(&thrown)).into())
            }
            Stmt::Block { body, .. } => self.exec_body(body, &scope.child()),
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Flow::Normal)
            }
            Stmt::Empty(_) => Ok(Flow::Normal),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    pub(crate) fn eval(self: &Rc<Self>, expr: &Expr, scope: &Scope) -> Exec<NativeValue> {
        match &expr.kind {
            ExprKind::Undefined => Ok(NativeValue::Undefined),
            ExprKind::Null => Ok(NativeValue::Null),
            ExprKind::Bool(b) => Ok(NativeValue::Bool(*b)),
            ExprKind::Number(n) => Ok(NativeValue::Number(*n)),
            ExprKind::String(s) => Ok(NativeValue::string(s)),
            ExprKind::Template(parts) => {
                let mut result = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(s) => result.push_str(s),
                        TemplatePart::Expr(expr) => result.push_str(&self.eval(expr, scope)?.to_string()),
                    }
                }
                Ok(NativeValue::string(result))
            }
            ExprKind::Array(items) => Ok(NativeValue::array(self.eval_items(items, scope)?)),
            ExprKind::Object(props) => self.eval_object(props, scope),

            ExprKind::Identifier(name) => self.lookup(name, scope),
            ExprKind::Member { object, property } => {
                let obj = self.eval(object, scope)?;
                Ok(ops::get_property(&obj, &property.name)?)
            }
            ExprKind::Index { object, index } => {
                let obj = self.eval(object, scope)?;
                let key = ops::property_key(&self.eval(index, scope)?);
                Ok(ops::get_property(&obj, &key)?)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, scope),

            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand, scope),
            ExprKind::Update {
                increment,
                prefix,
                target,
            } => self.eval_update(*increment, *prefix, target, scope),
            ExprKind::Binary { left, op, right } => {
                let lv = self.eval(left, scope)?;
                let rv = self.eval(right, scope)?;
                Ok(ops::binary(*op, &lv, &rv)?)
            }
            ExprKind::Logical { left, op, right } => {
                let lv = self.eval(left, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !lv.is_truthy(),
                    LogicalOp::Or => lv.is_truthy(),
                    LogicalOp::Coalesce => !lv.is_nullish(),
                };
                if short_circuit {
                    Ok(lv)
                } else {
                    self.eval(right, scope)
                }
            }
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.is_truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            ExprKind::Function(func) => Ok(self.make_function(func, scope, None)),
        }
    }

    /// Evaluate an initializer; anonymous functions take the binding's name.
    fn eval_named(self: &Rc<Self>, expr: &Expr, scope: &Scope, name: &str) -> Exec<NativeValue> {
        match &expr.kind {
            ExprKind::Function(func) if func.name.is_none() => Ok(self.make_function(func, scope, Some(name))),
            _ => self.eval(expr, scope),
        }
    }

    fn eval_items(self: &Rc<Self>, items: &[ArrayItem], scope: &Scope) -> Exec<Vec<NativeValue>> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Item(expr) => values.push(self.eval(expr, scope)?),
                ArrayItem::Spread(expr) => {
                    let spread = self.eval(expr, scope)?;
                    values.extend(iterate(&spread)?);
                }
            }
        }
        Ok(values)
    }

    fn eval_object(self: &Rc<Self>, props: &[Property], scope: &Scope) -> Exec<NativeValue> {
        let mut fields: IndexMap<String, NativeValue> = IndexMap::new();
        for prop in props {
            match prop {
                Property::Field { key, value } => {
                    let value = self.eval_named(value, scope, &key.name)?;
                    fields.insert(key.name.clone(), value);
                }
                Property::Spread(expr) => {
                    let source = self.eval(expr, scope)?;
                    fields.extend(object_entries(&source));
                }
            }
        }
        Ok(NativeValue::object(fields))
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Exec<NativeValue> {
        if let Some(value) = scope.lookup(name) {
            return Ok(value);
        }
        match self.host.get(name)? {
            Some(value) => Ok(value),
            None => Err(EvalError::UndefinedVariable(name.to_string()).into()),
        }
    }

    fn eval_call(self: &Rc<Self>, callee: &Expr, args: &[ArrayItem], scope: &Scope) -> Exec<NativeValue> {
        match &callee.kind {
            ExprKind::Member { object, property } => {
                let receiver = self.eval(object, scope)?;
                let args = self.eval_items(args, scope)?;
                self.call_method(&receiver, &property.name, &args)
            }
            ExprKind::Index { object, index } => {
                let receiver = self.eval(object, scope)?;
                let key = ops::property_key(&self.eval(index, scope)?);
                let args = self.eval_items(args, scope)?;
                self.call_method(&receiver, &key, &args)
            }
            _ => {
                let func = self.eval(callee, scope)?;
                let args = self.eval_items(args, scope)?;
                let what = match &callee.kind {
                    ExprKind::Identifier(name) => name.as_str(),
                    _ => "expression",
                };
                self.call_value(&func, &args, what)
            }
        }
    }

    fn eval_unary(self: &Rc<Self>, op: UnaryOp, operand: &Expr, scope: &Scope) -> Exec<NativeValue> {
        match op {
            UnaryOp::Typeof => {
                if let ExprKind::Identifier(name) = &operand.kind {
                    if !scope.contains(name) && !self.host.has(name) {
                        return Ok(NativeValue::string("undefined"));
                    }
                }
                let value = self.eval(operand, scope)?;
                Ok(NativeValue::string(value.type_of()))
            }
            UnaryOp::Delete => match &operand.kind {
                ExprKind::Identifier(name) => {
                    if scope.contains(name) {
                        Ok(NativeValue::Bool(false))
                    } else {
                        Err(EvalError::ReadOnly(name.clone()).into())
                    }
                }
                ExprKind::Member { object, property } => {
                    let obj = self.eval(object, scope)?;
                    Ok(NativeValue::Bool(ops::delete_property(&obj, &property.name)?))
                }
                ExprKind::Index { object, index } => {
                    let obj = self.eval(object, scope)?;
                    let key = ops::property_key(&self.eval(index, scope)?);
                    Ok(NativeValue::Bool(ops::delete_property(&obj, &key)?))
                }
                _ => {
                    self.eval(operand, scope)?;
                    Ok(NativeValue::Bool(true))
                }
            },
            UnaryOp::Neg => match self.eval(operand, scope)? {
                NativeValue::BigInt(n) => Ok(NativeValue::BigInt(Rc::new(-(*n).clone()))),
                value => Ok(NativeValue::Number(-value.to_number())),
            },
            UnaryOp::Plus => match self.eval(operand, scope)? {
                NativeValue::BigInt(_) => {
                    Err(EvalError::type_mismatch("cannot convert a BigInt value to a number").into())
                }
                value => Ok(NativeValue::Number(value.to_number())),
            },
            UnaryOp::Not => Ok(NativeValue::Bool(!self.eval(operand, scope)?.is_truthy())),
        }
    }

    // ── Assignment ──────────────────────────────────────────────────────

    fn resolve_target(self: &Rc<Self>, target: &Expr, scope: &Scope) -> Exec<Target> {
        match &target.kind {
            ExprKind::Identifier(name) => Ok(Target::Variable(name.clone())),
            ExprKind::Member { object, property } => {
                Ok(Target::Property(self.eval(object, scope)?, property.name.clone()))
            }
            ExprKind::Index { object, index } => {
                let obj = self.eval(object, scope)?;
                let key = ops::property_key(&self.eval(index, scope)?);
                Ok(Target::Property(obj, key))
            }
            _ => Err(EvalError::runtime("invalid assignment target").into()),
        }
    }

    fn read_target(&self, target: &Target, scope: &Scope) -> Exec<NativeValue> {
        match target {
            Target::Variable(name) => self.lookup(name, scope),
            Target::Property(object, key) => Ok(ops::get_property(object, key)?),
        }
    }

    fn write_target(&self, target: &Target, value: NativeValue, scope: &Scope) -> Exec<()> {
        match target {
            Target::Variable(name) => {
                if scope.assign(name, value)? {
                    Ok(())
                } else {
                    Err(EvalError::ReadOnly(name.clone()).into())
                }
            }
            Target::Property(object, key) => Ok(ops::set_property(object, key, value)?),
        }
    }

    fn eval_assign(self: &Rc<Self>, op: AssignOp, target: &Expr, value: &Expr, scope: &Scope) -> Exec<NativeValue> {
        let target = self.resolve_target(target, scope)?;
        let new_value = match op.binary() {
            None => match &target {
                Target::Variable(name) => self.eval_named(value, scope, name)?,
                Target::Property(..) => self.eval(value, scope)?,
            },
            Some(bin) => {
                let current = self.read_target(&target, scope)?;
                let rhs = self.eval(value, scope)?;
                ops::binary(bin, &current, &rhs)?
            }
        };
        self.write_target(&target, new_value.clone(), scope)?;
        Ok(new_value)
    }

    fn eval_update(self: &Rc<Self>, increment: bool, prefix: bool, target: &Expr, scope: &Scope) -> Exec<NativeValue> {
        let target = self.resolve_target(target, scope)?;
        let old = match self.read_target(&target, scope)? {
            big @ NativeValue::BigInt(_) => big,
            other => NativeValue::Number(other.to_number()),
        };
        let one = match old {
            NativeValue::BigInt(_) => NativeValue::BigInt(Rc::new(1.into())),
            _ => NativeValue::Number(1.0),
        };
        let op = if increment { BinOp::Add } else { BinOp::Sub };
        let new_value = ops::binary(op, &old, &one)?;
        self.write_target(&target, new_value.clone(), scope)?;
        Ok(if prefix { new_value } else { old })
    }
}

/// The items a `for...of` loop or spread walks over.
pub(crate) fn iterate(value: &NativeValue) -> Exec<Vec<NativeValue>> {
    match value {
        NativeValue::Array(items) => Ok(items.borrow().clone()),
        NativeValue::String(s) => Ok(s.chars().map(|c| NativeValue::string(c.to_string())).collect()),
        NativeValue::Bytes(bytes) => Ok(bytes.iter().map(|b| NativeValue::Number(f64::from(*b))).collect()),
        other => Err(EvalError::type_mismatch(format!("{} is not iterable", other.type_of())).into()),
    }
}
