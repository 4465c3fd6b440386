//! The IR interpreter. Walks the execution graph directly against the
//! in-memory engine, with the host's nil discipline and truthiness rules.
//! Arithmetic and comparison semantics deliberately mirror what the emitted
//! Lua would compute, so both backends observe identical behavior.

use redsym_core::ir::{BinOp, Block, Conv, Expr, LocalId, Script, Stmt, UnaryOp};
use redsym_core::{RedisError, Value};
use redsym_store::Store;

use crate::gfun;
use crate::plugin::PluginRegistry;
use crate::rfun;

/// Control flow threaded through block execution.
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Runs a script against the engine. `keys` and `args` are bound positionally
/// by the caller (registration order); the local frame starts out `Null`.
pub fn run(
    script: &Script,
    registry: &PluginRegistry,
    store: &mut Store,
    now_ms: u64,
    keys: &[String],
    args: &[Value],
) -> Result<Value, RedisError> {
    let mut frame = Frame {
        registry,
        store,
        now_ms,
        keys,
        args,
        locals: vec![Value::Null; script.locals.len()],
    };
    match frame.block(&script.body)? {
        Flow::Return(value) => Ok(value),
        _ => Ok(Value::Null),
    }
}

struct Frame<'a> {
    registry: &'a PluginRegistry,
    store: &'a mut Store,
    now_ms: u64,
    keys: &'a [String],
    args: &'a [Value],
    locals: Vec<Value>,
}

impl Frame<'_> {
    fn block(&mut self, block: &Block) -> Result<Flow, RedisError> {
        for stmt in &block.0 {
            match self.stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<Flow, RedisError> {
        match stmt {
            Stmt::Assign { target, value, .. } => {
                let value = self.eval(value)?;
                self.locals[target.0] = value;
                Ok(Flow::Normal)
            }
            Stmt::AssignIndex {
                target,
                index,
                value,
            } => {
                let ix = self.eval(index)?.coerce_int()?;
                let value = self.eval(value)?;
                self.assign_index(*target, ix, value)?;
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.block(then_block)
                } else {
                    self.block(else_block)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.is_truthy() {
                    match self.block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::ForEach {
                array,
                index,
                value,
                body,
            } => {
                let items = match self.eval(array)? {
                    Value::List(items) => items,
                    other => {
                        return Err(RedisError::script(format!(
                            "attempt to iterate a {} value",
                            other.type_name()
                        )));
                    }
                };
                for (ix, item) in items.into_iter().enumerate() {
                    self.locals[index.0] = Value::Int(ix as i64);
                    self.locals[value.0] = item;
                    match self.block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    fn assign_index(&mut self, target: LocalId, ix: i64, value: Value) -> Result<(), RedisError> {
        let slot = &mut self.locals[target.0];
        let Value::List(items) = slot else {
            return Err(RedisError::script(format!(
                "attempt to index a {} value",
                slot.type_name()
            )));
        };
        let len = items.len() as i64;
        if ix == len {
            items.push(value);
        } else if ix >= 0 && ix < len {
            items[ix as usize] = value;
        } else {
            return Err(RedisError::script(format!(
                "list assignment index out of range: {ix}"
            )));
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, RedisError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Local(id) => Ok(self.locals[id.0].clone()),
            Expr::Key(id) => Ok(Value::Str(self.keys[id.0].clone())),
            Expr::Arg(id) => Ok(self.args[id.0].clone()),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match arith_num(&value)? {
                        Value::Int(n) => Ok(Value::Int(-n)),
                        Value::Float(f) => Ok(Value::Float(-f)),
                        _ => unreachable!(),
                    },
                }
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                index_value(&target, &index)
            }
            Expr::Len(expr) => {
                let value = self.eval(expr)?;
                let len = match &value {
                    Value::List(items) => items.len(),
                    Value::Str(s) => s.len(),
                    Value::Map(map) => map.len(),
                    other => {
                        return Err(RedisError::script(format!(
                            "attempt to get length of a {} value",
                            other.type_name()
                        )));
                    }
                };
                Ok(Value::Int(len as i64))
            }
            Expr::Concat(items) => {
                let mut out = String::new();
                for item in items {
                    let value = self.eval(item)?;
                    match value {
                        Value::Str(_) | Value::Int(_) | Value::Float(_) => {
                            out.push_str(&value.to_display_string());
                        }
                        other => {
                            return Err(RedisError::script(format!(
                                "attempt to concatenate a {} value",
                                other.type_name()
                            )));
                        }
                    }
                }
                Ok(Value::Str(out))
            }
            Expr::Convert { conv, expr } => {
                let value = self.eval(expr)?;
                match conv {
                    Conv::ToNum => Ok(value.as_number().unwrap_or(Value::Null)),
                    Conv::ToStr => Ok(Value::Str(value.to_display_string())),
                    Conv::ToIntStr => gfun::general_call("asintstr", &[value]),
                }
            }
            Expr::Call {
                kind, name, args, ..
            } => {
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args {
                    evaluated.push(self.eval(arg)?);
                }
                match kind {
                    redsym_core::ir::CallKind::Redis => {
                        rfun::redis_call(self.store, self.now_ms, name, &evaluated)
                    }
                    redsym_core::ir::CallKind::General => gfun::general_call(name, &evaluated),
                    redsym_core::ir::CallKind::Plugin => match self.registry.plugin(name) {
                        Some(plugin) => plugin.call(self.store, self.now_ms, &evaluated),
                        None => Err(RedisError::NotImplemented(name.clone())),
                    },
                    redsym_core::ir::CallKind::Helper => {
                        Err(RedisError::NotImplemented(name.clone()))
                    }
                }
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
        }
    }

    fn binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<Value, RedisError> {
        match op {
            BinOp::And => {
                let l = self.eval(left)?;
                if l.is_truthy() { self.eval(right) } else { Ok(l) }
            }
            BinOp::Or => {
                let l = self.eval(left)?;
                if l.is_truthy() { Ok(l) } else { self.eval(right) }
            }
            _ => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                apply_binop(op, &l, &r)
            }
        }
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, RedisError> {
    match target {
        Value::List(items) => {
            let ix = index.coerce_int()?;
            let len = items.len() as i64;
            let ix = if ix < 0 { len + ix } else { ix };
            if ix < 0 || ix >= len {
                return Ok(Value::Null);
            }
            Ok(items[ix as usize].clone())
        }
        Value::Map(map) => {
            let key = match index {
                Value::Str(key) => key.clone(),
                other => other.to_display_string(),
            };
            Ok(map.get(&key).cloned().unwrap_or(Value::Null))
        }
        other => Err(RedisError::script(format!(
            "attempt to index a {} value",
            other.type_name()
        ))),
    }
}

/// An arithmetic operand: numbers pass, numeric strings coerce (the way Lua
/// arithmetic does), everything else is an error.
fn arith_num(value: &Value) -> Result<Value, RedisError> {
    value.as_number().ok_or_else(|| {
        RedisError::script(format!(
            "attempt to perform arithmetic on a {} value",
            value.type_name()
        ))
    })
}

pub(crate) fn apply_binop(op: BinOp, l: &Value, r: &Value) -> Result<Value, RedisError> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            let l = arith_num(l)?;
            let r = arith_num(r)?;
            arith(op, &l, &r)
        }
        BinOp::Eq => Ok(Value::Bool(value_eq(l, r))),
        BinOp::Ne => Ok(Value::Bool(!value_eq(l, r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => ordered(op, l, r),
        BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled by the caller"),
    }
}

/// Integer pairs stay integers except under division; any float operand makes
/// the result float. The modulo is a floor-mod, like Lua's `%`.
fn arith(op: BinOp, l: &Value, r: &Value) -> Result<Value, RedisError> {
    if let (Value::Int(a), Value::Int(b)) = (l, r)
        && !matches!(op, BinOp::Div)
    {
        let res = match op {
            BinOp::Add => a.checked_add(*b),
            BinOp::Sub => a.checked_sub(*b),
            BinOp::Mul => a.checked_mul(*b),
            BinOp::Rem => {
                if *b == 0 {
                    return Err(RedisError::script("attempt to perform n % 0"));
                }
                Some(((a % b) + b) % b)
            }
            _ => unreachable!(),
        };
        return res
            .map(Value::Int)
            .ok_or_else(|| RedisError::script("integer overflow"));
    }
    let a = match l {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        _ => unreachable!(),
    };
    let b = match r {
        Value::Int(n) => *n as f64,
        Value::Float(f) => *f,
        _ => unreachable!(),
    };
    let res = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Rem => a - (a / b).floor() * b,
        _ => unreachable!(),
    };
    Ok(Value::Float(res))
}

fn value_eq(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
        _ => l == r,
    }
}

/// Ordered comparison with the string-to-number coercion rule: a string
/// compared against a number is read as a number first.
fn ordered(op: BinOp, l: &Value, r: &Value) -> Result<Value, RedisError> {
    let incomparable = || {
        RedisError::script(format!(
            "attempt to compare {} with {}",
            l.type_name(),
            r.type_name()
        ))
    };
    let coerced_l;
    let coerced_r;
    let (a, b) = match (l, r) {
        (Value::Str(_), Value::Int(_) | Value::Float(_)) => {
            coerced_l = l.as_number().ok_or_else(incomparable)?;
            (&coerced_l, r)
        }
        (Value::Int(_) | Value::Float(_), Value::Str(_)) => {
            coerced_r = r.as_number().ok_or_else(incomparable)?;
            (l, &coerced_r)
        }
        _ => (l, r),
    };
    let ord = match (a, b) {
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let x = a.coerce_float().map_err(|_| incomparable())?;
            let y = b.coerce_float().map_err(|_| incomparable())?;
            x.partial_cmp(&y).ok_or_else(incomparable)?
        }
        _ => return Err(incomparable()),
    };
    let res = match op {
        BinOp::Lt => ord.is_lt(),
        BinOp::Le => ord.is_le(),
        BinOp::Gt => ord.is_gt(),
        BinOp::Ge => ord.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(res))
}

/// Boundary canonicalization shared by both backends: whole floats re-tag as
/// integers (Lua has one number type) and the outermost empty container
/// collapses to `Null`.
#[must_use]
pub fn boundary(value: Value) -> Value {
    fn retag(value: Value) -> Value {
        match value {
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e17 => {
                Value::Int(f as i64)
            }
            Value::List(items) => Value::List(items.into_iter().map(retag).collect()),
            Value::Map(map) => Value::Map(map.into_iter().map(|(k, v)| (k, retag(v))).collect()),
            other => other,
        }
    }
    retag(value).collapse_empty()
}
