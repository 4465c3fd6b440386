//! The IR-to-Lua emitter. Lowers a script to Lua 5.1 text acceptable to
//! `EVAL`, repairing the divergences between Lua and the interpreter:
//! 1-based table indexing, `false` standing in for missing replies, Lua's
//! truthiness (where `0` and `""` are true), the missing `continue`
//! statement, and the JSON framing of arguments and the return value.

use std::collections::{BTreeSet, HashSet};

use redsym_core::ir::{BinOp, Block, CallKind, Conv, Expr, Script, Stmt, UnaryOp};
use redsym_core::value::fmt_float;
use redsym_core::{RedisError, Value};

use crate::patch::{self, HELPER_PKG};
use crate::plugin::PluginRegistry;

/// Emits the Lua program of a script. Helper functions are included once,
/// and only when used.
pub fn emit(script: &Script, registry: &PluginRegistry) -> Result<String, RedisError> {
    let mut emitter = Emitter {
        script,
        registry,
        helpers: BTreeSet::new(),
        index_locals: collect_index_locals(&script.body),
    };
    let mut body = Vec::new();
    emitter.prologue(&mut body);
    emitter.block(&script.body, 0, LoopCtx::None, &mut body)?;

    let mut out = Vec::new();
    if !emitter.helpers.is_empty() {
        out.push("-- HELPERS START --".to_string());
        out.push(format!("local {HELPER_PKG} = {{}}"));
        for name in &emitter.helpers {
            let helper = patch::helper(name).expect("helper table is closed");
            out.push(format!("function {HELPER_PKG}.{} ({})", helper.name, helper.args));
            for line in helper.body {
                out.push(format!("  {line}"));
            }
            out.push("end".to_string());
        }
        out.push("-- HELPERS END --".to_string());
    }
    out.extend(body);
    Ok(out.join("\n") + "\n")
}

fn collect_index_locals(block: &Block) -> HashSet<usize> {
    fn walk(block: &Block, acc: &mut HashSet<usize>) {
        for stmt in &block.0 {
            match stmt {
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    walk(then_block, acc);
                    walk(else_block, acc);
                }
                Stmt::While { body, .. } => walk(body, acc),
                Stmt::ForEach { index, body, .. } => {
                    acc.insert(index.0);
                    walk(body, acc);
                }
                _ => {}
            }
        }
    }
    let mut acc = HashSet::new();
    walk(block, &mut acc);
    acc
}

/// How `break` and `continue` lower inside the enclosing loop body.
#[derive(Clone, Copy, PartialEq)]
enum LoopCtx {
    None,
    /// Plain loop body; `break` maps directly.
    Plain,
    /// Body wrapped in `repeat ... until true` because a `continue` occurs;
    /// `continue` becomes the inner `break`, a real `break` sets the flag.
    Wrapped,
}

struct Emitter<'a> {
    script: &'a Script,
    registry: &'a PluginRegistry,
    helpers: BTreeSet<&'static str>,
    index_locals: HashSet<usize>,
}

impl Emitter<'_> {
    fn helper(&mut self, name: &'static str) -> String {
        self.helpers.insert(name);
        format!("{HELPER_PKG}.{name}")
    }

    /// Key and argument bindings. Keys stay positional strings; all value
    /// arguments arrive as one JSON array in `ARGV[1]`, decoded once.
    fn prologue(&mut self, out: &mut Vec<String>) {
        if !self.script.keys.is_empty() {
            out.push(format!("-- keys: {}", self.script.keys.join(", ")));
        }
        if !self.script.args.is_empty() {
            out.push(format!("-- args: {}", self.script.args.join(", ")));
        }
        for (ix, name) in self.script.keys.iter().enumerate() {
            out.push(format!("local key_{ix} = (KEYS[{}])  -- {name}", ix + 1));
        }
        if !self.script.args.is_empty() {
            let denull = self.helper("denull");
            out.push(format!("local __argv = {denull}(cjson.decode(ARGV[1]))"));
            for (ix, name) in self.script.args.iter().enumerate() {
                out.push(format!("local arg_{ix} = __argv[{}]  -- {name}", ix + 1));
            }
        }
    }

    fn block(
        &mut self,
        block: &Block,
        indent: usize,
        ctx: LoopCtx,
        out: &mut Vec<String>,
    ) -> Result<(), RedisError> {
        for stmt in &block.0 {
            self.stmt(stmt, indent, ctx, out)?;
        }
        Ok(())
    }

    fn push(out: &mut Vec<String>, indent: usize, line: String) {
        out.push(format!("{}{line}", "  ".repeat(indent)));
    }

    fn stmt(
        &mut self,
        stmt: &Stmt,
        indent: usize,
        ctx: LoopCtx,
        out: &mut Vec<String>,
    ) -> Result<(), RedisError> {
        match stmt {
            Stmt::Assign {
                target,
                value,
                declare,
            } => {
                let rhs = self.expr(value, false)?;
                let name = &self.script.locals[target.0];
                let decl = if *declare { "local " } else { "" };
                Self::push(out, indent, format!("{decl}{name} = {rhs}"));
            }
            Stmt::AssignIndex {
                target,
                index,
                value,
            } => {
                let name = &self.script.locals[target.0];
                let ix = self.index_expr(index)?;
                let rhs = self.expr(value, false)?;
                Self::push(out, indent, format!("{name}[{ix}] = {rhs}"));
            }
            Stmt::Expr(expr) => {
                let line = self.expr(expr, true)?;
                Self::push(out, indent, line);
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                let cond = self.cond_expr(cond)?;
                Self::push(out, indent, format!("if {cond} then"));
                self.block(then_block, indent + 1, ctx, out)?;
                if !else_block.0.is_empty() {
                    Self::push(out, indent, "else".to_string());
                    self.block(else_block, indent + 1, ctx, out)?;
                }
                Self::push(out, indent, "end".to_string());
            }
            Stmt::While { cond, body } => {
                let cond = self.cond_expr(cond)?;
                Self::push(out, indent, format!("while {cond} do"));
                self.loop_body(body, indent, out)?;
                Self::push(out, indent, "end".to_string());
            }
            Stmt::ForEach {
                array,
                index,
                value,
                body,
            } => {
                let arr = self.expr(array, false)?;
                let ix_name = &self.script.locals[index.0];
                let val_name = &self.script.locals[value.0];
                Self::push(
                    out,
                    indent,
                    format!("for {ix_name}, {val_name} in ipairs({arr}) do"),
                );
                self.loop_body(body, indent, out)?;
                Self::push(out, indent, "end".to_string());
            }
            Stmt::Break => match ctx {
                LoopCtx::Wrapped => {
                    Self::push(out, indent, "__brk = true".to_string());
                    Self::push(out, indent, "break".to_string());
                }
                _ => Self::push(out, indent, "break".to_string()),
            },
            Stmt::Continue => {
                // Lua 5.1 has no continue; inside the repeat-wrapper the
                // inner break takes its place.
                Self::push(out, indent, "do break end".to_string());
            }
            Stmt::Return(expr) => match expr {
                Some(expr) => {
                    let value = self.expr(expr, false)?;
                    Self::push(out, indent, format!("return cjson.encode({value})"));
                }
                // A bare return reaches the host as a nil reply, the same
                // `Null` the interpreter yields for it.
                None => Self::push(out, indent, "return".to_string()),
            },
        }
        Ok(())
    }

    /// Emits a loop body, installing the `repeat ... until true` wrapper when
    /// the body uses `continue` (scanning stops at nested loops, whose
    /// breaks are their own).
    fn loop_body(
        &mut self,
        body: &Block,
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), RedisError> {
        let (has_continue, has_break) = scan_jumps(body);
        if !has_continue {
            return self.block(body, indent + 1, LoopCtx::Plain, out);
        }
        if has_break {
            Self::push(out, indent + 1, "local __brk = false".to_string());
        }
        Self::push(out, indent + 1, "repeat".to_string());
        self.block(body, indent + 2, LoopCtx::Wrapped, out)?;
        Self::push(out, indent + 1, "until true".to_string());
        if has_break {
            Self::push(out, indent + 1, "if __brk then break end".to_string());
        }
        Ok(())
    }

    /// A branch or loop condition under host truthiness. Expressions that
    /// are already boolean skip the wrapper.
    fn cond_expr(&mut self, expr: &Expr) -> Result<String, RedisError> {
        let emitted = self.expr(expr, false)?;
        if is_boolean_expr(expr) {
            return Ok(emitted);
        }
        let truthy = self.helper("truthy");
        Ok(format!("{truthy}({emitted})"))
    }

    /// A table subscript with the 1-based adjustment folded into literals.
    fn index_expr(&mut self, index: &Expr) -> Result<String, RedisError> {
        if let Expr::Lit(Value::Int(n)) = index
            && *n >= 0
        {
            return Ok(format!("{}", n + 1));
        }
        let emitted = self.expr(index, false)?;
        Ok(format!("{emitted} + 1"))
    }

    fn expr(&mut self, expr: &Expr, is_expr_stmt: bool) -> Result<String, RedisError> {
        match expr {
            Expr::Lit(value) => Ok(self.literal(value)),
            Expr::Local(id) => {
                let name = &self.script.locals[id.0];
                if self.index_locals.contains(&id.0) {
                    Ok(format!("({name} - 1)"))
                } else {
                    Ok(name.clone())
                }
            }
            Expr::Key(id) => Ok(format!("key_{}", id.0)),
            Expr::Arg(id) => Ok(format!("arg_{}", id.0)),
            Expr::Unary { op, expr } => match op {
                UnaryOp::Not => {
                    let inner = self.cond_expr(expr)?;
                    Ok(format!("(not {inner})"))
                }
                UnaryOp::Neg => {
                    let inner = self.expr(expr, false)?;
                    Ok(format!("(-{inner})"))
                }
            },
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Index { target, index } => {
                let tbl = self.expr(target, false)?;
                match index.as_ref() {
                    Expr::Lit(Value::Int(n)) if *n >= 0 => Ok(format!("{tbl}[{}]", n + 1)),
                    Expr::Lit(Value::Str(s)) => Ok(format!("{tbl}[{}]", quote(s))),
                    other => {
                        let at = self.helper("at");
                        let ix = self.expr(other, false)?;
                        Ok(format!("{at}({tbl}, {ix})"))
                    }
                }
            }
            Expr::Len(expr) => {
                let inner = self.expr(expr, false)?;
                match expr.as_ref() {
                    Expr::Local(_) | Expr::Key(_) | Expr::Arg(_) => Ok(format!("#{inner}")),
                    _ => Ok(format!("#({inner})")),
                }
            }
            Expr::Concat(items) => {
                let parts: Result<Vec<String>, RedisError> = items
                    .iter()
                    .map(|item| Ok(format!("({})", self.expr(item, false)?)))
                    .collect();
                Ok(parts?.join(" .. "))
            }
            Expr::Convert { conv, expr } => {
                let inner = self.expr(expr, false)?;
                match conv {
                    Conv::ToNum => Ok(format!("tonumber({inner})")),
                    Conv::ToStr => Ok(format!("tostring({inner})")),
                    Conv::ToIntStr => {
                        let asintstr = self.helper("asintstr");
                        Ok(format!("{asintstr}({inner})"))
                    }
                }
            }
            Expr::Call {
                kind,
                name,
                args,
                raw,
            } => self.call(*kind, name, args, *raw, is_expr_stmt),
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.cond_expr(cond)?;
                let then = self.expr(then, false)?;
                let otherwise = self.expr(otherwise, false)?;
                Ok(format!(
                    "(function() if {cond} then return {then} end return {otherwise} end)()"
                ))
            }
        }
    }

    fn binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<String, RedisError> {
        match op {
            BinOp::And | BinOp::Or => {
                let l = self.expr(left, false)?;
                let r = self.expr(right, false)?;
                let truthy = self.helper("truthy");
                // Plain `and`/`or` would apply Lua truthiness, where 0 and
                // the empty string are true; the closure keeps the host
                // rules and the short-circuit.
                let body = match op {
                    BinOp::And => format!("if {truthy}(__v) then return {r} end return __v"),
                    _ => format!("if {truthy}(__v) then return __v end return {r}"),
                };
                Ok(format!("(function() local __v = {l} {body} end)()"))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let cmp = self.helper("cmp");
                let tag = match op {
                    BinOp::Lt => "lt",
                    BinOp::Le => "le",
                    BinOp::Gt => "gt",
                    _ => "ge",
                };
                let l = self.expr(left, false)?;
                let r = self.expr(right, false)?;
                Ok(format!("{cmp}(\"{tag}\", {l}, {r})"))
            }
            _ => {
                let symbol = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Rem => "%",
                    BinOp::Eq => "==",
                    BinOp::Ne => "~=",
                    _ => unreachable!(),
                };
                let l = self.expr(left, false)?;
                let r = self.expr(right, false)?;
                Ok(format!("({l} {symbol} {r})"))
            }
        }
    }

    fn call(
        &mut self,
        kind: CallKind,
        name: &str,
        args: &[Expr],
        raw: bool,
        is_expr_stmt: bool,
    ) -> Result<String, RedisError> {
        if !raw {
            let call = Expr::Call {
                kind,
                name: name.to_string(),
                args: args.to_vec(),
                raw: false,
            };
            let patched = match kind {
                CallKind::Redis => self
                    .registry
                    .redis_patch(name)
                    .cloned()
                    .map(|p| p.patch(name, call.clone(), is_expr_stmt)),
                CallKind::General => self
                    .registry
                    .general_patch(name)
                    .cloned()
                    .map(|p| p.patch(name, call.clone(), is_expr_stmt)),
                CallKind::Plugin => match self.registry.plugin(name) {
                    Some(plugin) => Some(plugin.emit(args.to_vec(), is_expr_stmt)),
                    None => {
                        return Err(RedisError::parse(format!(
                            "plugin operation '{name}' is not registered"
                        )));
                    }
                },
                CallKind::Helper => None,
            };
            if let Some(patched) = patched {
                return match &patched {
                    Expr::Call {
                        kind,
                        name,
                        args,
                        raw: true,
                    } => self.call(*kind, name, args, true, is_expr_stmt),
                    other => self.expr(other, false),
                };
            }
        }
        let mut parts = Vec::with_capacity(args.len() + 1);
        if kind == CallKind::Redis {
            parts.push(quote(name));
        }
        for arg in args {
            parts.push(self.expr(arg, false)?);
        }
        let argstr = parts.join(", ");
        match kind {
            CallKind::Redis => Ok(format!("redis.call({argstr})")),
            CallKind::General => Ok(format!("{name}({argstr})")),
            CallKind::Helper => {
                let Some(helper) = patch::helper_name(name) else {
                    return Err(RedisError::parse(format!("unknown helper '{name}'")));
                };
                let qualified = self.helper(helper);
                Ok(format!("{qualified}({argstr})"))
            }
            CallKind::Plugin => Err(RedisError::parse(format!(
                "plugin operation '{name}' cannot be emitted directly"
            ))),
        }
    }

    fn literal(&mut self, value: &Value) -> String {
        match value {
            Value::Null => "nil".to_string(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => fmt_float(*f),
            Value::Str(s) => quote(s),
            Value::List(_) | Value::Map(_) => {
                format!("cjson.decode({})", quote(&value.to_json()))
            }
        }
    }
}

fn quote(s: &str) -> String {
    let escaped = s
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t");
    format!("\"{escaped}\"")
}

/// Whether an expression already evaluates to a Lua boolean, making the
/// truthiness wrapper redundant.
fn is_boolean_expr(expr: &Expr) -> bool {
    match expr {
        Expr::Lit(Value::Bool(_)) => true,
        Expr::Unary {
            op: UnaryOp::Not, ..
        } => true,
        Expr::Binary { op, .. } => matches!(
            op,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        ),
        _ => false,
    }
}

/// Finds `continue`/`break` statements belonging to this loop body, not
/// descending into nested loops.
fn scan_jumps(block: &Block) -> (bool, bool) {
    let mut has_continue = false;
    let mut has_break = false;
    fn walk(block: &Block, has_continue: &mut bool, has_break: &mut bool) {
        for stmt in &block.0 {
            match stmt {
                Stmt::Continue => *has_continue = true,
                Stmt::Break => *has_break = true,
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    walk(then_block, has_continue, has_break);
                    walk(else_block, has_continue, has_break);
                }
                _ => {}
            }
        }
    }
    walk(block, &mut has_continue, &mut has_break);
    (has_continue, has_break)
}
