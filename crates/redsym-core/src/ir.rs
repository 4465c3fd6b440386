//! The execution graph produced by the symbolic builder. Expressions evaluate
//! to a value and have no side effects except through calls; statements are
//! executed for effect. Every node is immutable once built and the graph is a
//! DAG by construction.

use crate::cmd::Arity;
use crate::error::RedisError;
use crate::value::Value;

/// Slot index of a local variable. Stable for the lifetime of the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalId(pub usize);

/// Index of a registered key argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId(pub usize);

/// Index of a registered value argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArgId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    /// Ordered comparisons coerce numeric strings before comparing.
    #[must_use]
    pub fn is_ordered_compare(self) -> bool {
        matches!(self, Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }
}

/// Built-in conversions. These are IR nodes rather than general calls so both
/// backends can special-case them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conv {
    /// String to number, or `Null` when no numeric reading exists.
    ToNum,
    /// Number to its integer string representation.
    ToIntStr,
    /// Any scalar to a string.
    ToStr,
}

/// The closed set of call dispatch kinds. Unknown ops fail at registration,
/// never at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// A redis command; the first argument is the key.
    Redis,
    /// A backend-independent script function such as `string.find`.
    General,
    /// An emitter-internal helper. Only introduced by emission patches.
    Helper,
    /// A user-registered plugin operation.
    Plugin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Value),
    Local(LocalId),
    Key(KeyId),
    Arg(ArgId),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// 0-based list indexing (negative counts from the end) or map lookup.
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Len(Box<Expr>),
    Concat(Vec<Expr>),
    Convert {
        conv: Conv,
        expr: Box<Expr>,
    },
    Call {
        kind: CallKind,
        name: String,
        args: Vec<Expr>,
        /// Suppresses emission patches for this call.
        raw: bool,
    },
    /// Ternary: evaluates exactly one of the two arms.
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// The literal string carried by this expression, if it is one. Emission
    /// patches use this to inspect command flags at compile time.
    #[must_use]
    pub fn as_literal_str(&self) -> Option<&str> {
        match self {
            Self::Lit(Value::Str(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `declare` marks the first assignment of a local; the emitter turns it
    /// into a `local` statement and the slot's initial expression lives here.
    Assign {
        target: LocalId,
        value: Expr,
        declare: bool,
    },
    AssignIndex {
        target: LocalId,
        index: Expr,
        value: Expr,
    },
    Expr(Expr),
    If {
        cond: Expr,
        then_block: Block,
        else_block: Block,
    },
    While {
        cond: Expr,
        body: Block,
    },
    /// Iterates a list, binding a 0-based index and the element value.
    ForEach {
        array: Expr,
        index: LocalId,
        value: LocalId,
        body: Block,
    },
    Break,
    Continue,
    Return(Option<Expr>),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block(pub Vec<Stmt>);

/// A frozen script: the named key and argument order, the local slot table,
/// and the statement body. The return value is a `Return` statement; a script
/// without one yields `Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub keys: Vec<String>,
    pub args: Vec<String>,
    pub locals: Vec<String>,
    pub body: Block,
}

impl Script {
    /// Structural validation plus call resolution. `resolve` must return the
    /// arity of a known op (for `Redis` kinds the arity counts arguments
    /// after the key) or `None` for an unknown one.
    pub fn validate<F>(&self, resolve: F) -> Result<(), RedisError>
    where
        F: Fn(CallKind, &str) -> Option<Arity>,
    {
        let mut walker = Walker {
            script: self,
            resolve,
            loop_depth: 0,
        };
        walker.block(&self.body)
    }
}

struct Walker<'a, F> {
    script: &'a Script,
    resolve: F,
    loop_depth: usize,
}

impl<F> Walker<'_, F>
where
    F: Fn(CallKind, &str) -> Option<Arity>,
{
    fn block(&mut self, block: &Block) -> Result<(), RedisError> {
        for stmt in &block.0 {
            self.stmt(stmt)?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), RedisError> {
        match stmt {
            Stmt::Assign { target, value, .. } => {
                self.local(*target)?;
                self.expr(value)
            }
            Stmt::AssignIndex {
                target,
                index,
                value,
            } => {
                self.local(*target)?;
                self.expr(index)?;
                self.expr(value)
            }
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                self.expr(cond)?;
                self.block(then_block)?;
                self.block(else_block)
            }
            Stmt::While { cond, body } => {
                self.expr(cond)?;
                self.loop_depth += 1;
                let res = self.block(body);
                self.loop_depth -= 1;
                res
            }
            Stmt::ForEach {
                array,
                index,
                value,
                body,
            } => {
                self.expr(array)?;
                self.local(*index)?;
                self.local(*value)?;
                self.loop_depth += 1;
                let res = self.block(body);
                self.loop_depth -= 1;
                res
            }
            Stmt::Break => {
                if self.loop_depth == 0 {
                    return Err(RedisError::parse("break outside of a loop"));
                }
                Ok(())
            }
            Stmt::Continue => {
                if self.loop_depth == 0 {
                    return Err(RedisError::parse("continue outside of a loop"));
                }
                Ok(())
            }
            Stmt::Return(expr) => expr.as_ref().map_or(Ok(()), |e| self.expr(e)),
        }
    }

    fn expr(&mut self, expr: &Expr) -> Result<(), RedisError> {
        match expr {
            Expr::Lit(_) => Ok(()),
            Expr::Local(id) => self.local(*id),
            Expr::Key(KeyId(ix)) => {
                if *ix >= self.script.keys.len() {
                    return Err(RedisError::parse(format!("undeclared key #{ix}")));
                }
                Ok(())
            }
            Expr::Arg(ArgId(ix)) => {
                if *ix >= self.script.args.len() {
                    return Err(RedisError::parse(format!("undeclared argument #{ix}")));
                }
                Ok(())
            }
            Expr::Unary { expr, .. } | Expr::Len(expr) | Expr::Convert { expr, .. } => {
                self.expr(expr)
            }
            Expr::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)
            }
            Expr::Index { target, index } => {
                self.expr(target)?;
                self.expr(index)
            }
            Expr::Concat(items) => {
                for item in items {
                    self.expr(item)?;
                }
                Ok(())
            }
            Expr::Call {
                kind, name, args, ..
            } => {
                let Some(arity) = (self.resolve)(*kind, name) else {
                    return Err(RedisError::parse(format!("unknown operation '{name}'")));
                };
                let argc = match kind {
                    CallKind::Redis => {
                        if args.is_empty() {
                            return Err(RedisError::Arity(name.clone()));
                        }
                        args.len() - 1
                    }
                    _ => args.len(),
                };
                if !arity.check(argc) {
                    return Err(RedisError::Arity(name.clone()));
                }
                for arg in args {
                    self.expr(arg)?;
                }
                Ok(())
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                self.expr(cond)?;
                self.expr(then)?;
                self.expr(otherwise)
            }
        }
    }

    fn local(&self, LocalId(ix): LocalId) -> Result<(), RedisError> {
        if ix >= self.script.locals.len() {
            return Err(RedisError::parse(format!("undeclared local #{ix}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Block, CallKind, Expr, LocalId, Script, Stmt};
    use crate::cmd;
    use crate::value::Value;

    fn resolve(kind: CallKind, name: &str) -> Option<cmd::Arity> {
        match kind {
            CallKind::Redis => cmd::redis_command(name).map(|spec| spec.arity),
            CallKind::General => cmd::general_command(name).map(|spec| spec.arity),
            _ => None,
        }
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let script = Script {
            keys: Vec::new(),
            args: Vec::new(),
            locals: Vec::new(),
            body: Block(vec![Stmt::Break]),
        };
        assert!(script.validate(resolve).is_err());
    }

    #[test]
    fn unknown_redis_op_is_rejected() {
        let script = Script {
            keys: vec!["k".to_string()],
            args: Vec::new(),
            locals: Vec::new(),
            body: Block(vec![Stmt::Expr(Expr::Call {
                kind: CallKind::Redis,
                name: "frobnicate".to_string(),
                args: vec![Expr::Key(super::KeyId(0))],
                raw: false,
            })]),
        };
        assert!(script.validate(resolve).is_err());
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let script = Script {
            keys: vec!["k".to_string()],
            args: Vec::new(),
            locals: Vec::new(),
            body: Block(vec![Stmt::Expr(Expr::Call {
                kind: CallKind::Redis,
                name: "get".to_string(),
                args: vec![Expr::Key(super::KeyId(0)), Expr::Lit(Value::Int(1))],
                raw: false,
            })]),
        };
        assert!(script.validate(resolve).is_err());
    }

    #[test]
    fn well_formed_script_passes() {
        let script = Script {
            keys: vec!["k".to_string()],
            args: Vec::new(),
            locals: vec!["var_0".to_string()],
            body: Block(vec![
                Stmt::Assign {
                    target: LocalId(0),
                    value: Expr::Call {
                        kind: CallKind::Redis,
                        name: "get".to_string(),
                        args: vec![Expr::Key(super::KeyId(0))],
                        raw: false,
                    },
                    declare: true,
                },
                Stmt::Return(Some(Expr::Local(LocalId(0)))),
            ]),
        };
        script.validate(resolve).unwrap();
    }
}
