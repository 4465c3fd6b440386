use std::cell::RefCell;
use std::rc::Rc;

use redsym_core::RedisError;
use redsym_core::cmd;
use redsym_core::ir::{self, CallKind, Expr, KeyId, LocalId, Script};

use crate::sym::Sym;

/// A statement ready to be added to a block.
pub struct StmtNode(pub(crate) BuildStmt);

impl From<Sym> for StmtNode {
    fn from(sym: Sym) -> Self {
        Self(BuildStmt::Plain(ir::Stmt::Expr(sym.expr())))
    }
}

/// Marks the nearest enclosing loop for termination.
#[must_use]
pub fn break_loop() -> StmtNode {
    StmtNode(BuildStmt::Plain(ir::Stmt::Break))
}

/// Skips to the next iteration of the nearest enclosing loop.
#[must_use]
pub fn continue_loop() -> StmtNode {
    StmtNode(BuildStmt::Plain(ir::Stmt::Continue))
}

/// Statements under construction. Nested blocks are arena references so that
/// branch and loop bodies can be filled in after their parent statement was
/// added.
pub(crate) enum BuildStmt {
    Plain(ir::Stmt),
    If {
        cond: Expr,
        then_id: usize,
        else_id: usize,
    },
    While {
        cond: Expr,
        body_id: usize,
    },
    ForEach {
        array: Expr,
        index: LocalId,
        value: LocalId,
        body_id: usize,
    },
}

struct BuilderState {
    keys: Vec<String>,
    args: Vec<String>,
    locals: Vec<String>,
    blocks: Vec<Vec<BuildStmt>>,
    loops: usize,
    has_return: bool,
    pending_error: Option<RedisError>,
}

impl BuilderState {
    fn fail(&mut self, msg: String) {
        if self.pending_error.is_none() {
            self.pending_error = Some(RedisError::parse(msg));
        }
    }
}

/// A handle to a local variable slot.
#[derive(Clone)]
pub struct LocalHandle {
    id: LocalId,
}

impl LocalHandle {
    #[must_use]
    pub fn sym(&self) -> Sym {
        Sym(Expr::Local(self.id))
    }

    #[must_use]
    pub fn assign(&self, value: impl Into<Sym>) -> StmtNode {
        StmtNode(BuildStmt::Plain(ir::Stmt::Assign {
            target: self.id,
            value: value.into().expr(),
            declare: false,
        }))
    }

    /// Assigns to an index of the list held by this local. Writing one past
    /// the end appends.
    #[must_use]
    pub fn set_at(&self, index: impl Into<Sym>, value: impl Into<Sym>) -> StmtNode {
        StmtNode(BuildStmt::Plain(ir::Stmt::AssignIndex {
            target: self.id,
            index: index.into().expr(),
            value: value.into().expr(),
        }))
    }

    #[must_use]
    pub fn at(&self, index: impl Into<Sym>) -> Sym {
        self.sym().at(index)
    }

    #[must_use]
    pub fn len_(&self) -> Sym {
        self.sym().len_()
    }
}

impl From<&LocalHandle> for Sym {
    fn from(handle: &LocalHandle) -> Self {
        handle.sym()
    }
}

impl From<LocalHandle> for Sym {
    fn from(handle: LocalHandle) -> Self {
        handle.sym()
    }
}

/// A statement block under construction. Cloning shares the underlying
/// builder.
#[derive(Clone)]
pub struct Block {
    state: Rc<RefCell<BuilderState>>,
    id: usize,
}

impl Block {
    pub fn add(&self, node: impl Into<StmtNode>) {
        let node = node.into();
        self.state.borrow_mut().blocks[self.id].push(node.0);
    }

    /// Creates a branch; returns the then and else blocks.
    pub fn if_(&self, cond: impl Into<Sym>) -> (Block, Block) {
        let (then_id, else_id) = {
            let mut state = self.state.borrow_mut();
            let then_id = state.blocks.len();
            state.blocks.push(Vec::new());
            let else_id = state.blocks.len();
            state.blocks.push(Vec::new());
            state.blocks[self.id].push(BuildStmt::If {
                cond: cond.into().expr(),
                then_id,
                else_id,
            });
            (then_id, else_id)
        };
        (self.block(then_id), self.block(else_id))
    }

    /// Creates a loop executed while the condition holds; returns its body.
    pub fn while_(&self, cond: impl Into<Sym>) -> Block {
        let body_id = {
            let mut state = self.state.borrow_mut();
            let body_id = state.blocks.len();
            state.blocks.push(Vec::new());
            state.blocks[self.id].push(BuildStmt::While {
                cond: cond.into().expr(),
                body_id,
            });
            body_id
        };
        self.block(body_id)
    }

    /// Creates a loop over a list; returns the body plus the 0-based index
    /// and element value expressions.
    pub fn for_(&self, array: impl Into<Sym>) -> (Block, Sym, Sym) {
        let (body_id, index, value) = {
            let mut state = self.state.borrow_mut();
            let loop_ix = state.loops;
            state.loops += 1;
            let index = LocalId(state.locals.len());
            state.locals.push(format!("ix_{loop_ix}"));
            let value = LocalId(state.locals.len());
            state.locals.push(format!("val_{loop_ix}"));
            let body_id = state.blocks.len();
            state.blocks.push(Vec::new());
            state.blocks[self.id].push(BuildStmt::ForEach {
                array: array.into().expr(),
                index,
                value,
                body_id,
            });
            (body_id, index, value)
        };
        (
            self.block(body_id),
            Sym(Expr::Local(index)),
            Sym(Expr::Local(value)),
        )
    }

    fn block(&self, id: usize) -> Block {
        Block {
            state: Rc::clone(&self.state),
            id,
        }
    }
}

/// The base context of a script. Keys, arguments, locals, statements, and the
/// return value are all registered through this type; `compile` freezes the
/// result into IR.
pub struct FnContext {
    root: Block,
}

impl Default for FnContext {
    fn default() -> Self {
        Self::new()
    }
}

impl FnContext {
    #[must_use]
    pub fn new() -> Self {
        let state = BuilderState {
            keys: Vec::new(),
            args: Vec::new(),
            locals: Vec::new(),
            blocks: vec![Vec::new()],
            loops: 0,
            has_return: false,
            pending_error: None,
        };
        Self {
            root: Block {
                state: Rc::new(RefCell::new(state)),
                id: 0,
            },
        }
    }

    /// Registers a key argument and returns an expression reading it.
    pub fn add_key(&self, name: &str) -> Sym {
        let mut state = self.root.state.borrow_mut();
        if state.keys.iter().any(|k| k == name) {
            state.fail(format!("ambiguous key name: {name}"));
        }
        let id = KeyId(state.keys.len());
        state.keys.push(name.to_string());
        Sym(Expr::Key(id))
    }

    /// Registers a value argument and returns an expression reading it.
    pub fn add_arg(&self, name: &str) -> Sym {
        let mut state = self.root.state.borrow_mut();
        if state.args.iter().any(|a| a == name) {
            state.fail(format!("ambiguous arg name: {name}"));
        }
        let id = ir::ArgId(state.args.len());
        state.args.push(name.to_string());
        Sym(Expr::Arg(id))
    }

    /// Registers a local variable with an initial expression. The initializer
    /// runs at the registration point, in statement order.
    pub fn add_local(&self, init: impl Into<Sym>) -> LocalHandle {
        let mut state = self.root.state.borrow_mut();
        let id = LocalId(state.locals.len());
        state.locals.push(format!("var_{}", id.0));
        state.blocks[0].push(BuildStmt::Plain(ir::Stmt::Assign {
            target: id,
            value: init.into().expr(),
            declare: true,
        }));
        LocalHandle { id }
    }

    /// Registers the script's single return value.
    pub fn set_return_value(&self, value: impl Into<Sym>) {
        let mut state = self.root.state.borrow_mut();
        if state.has_return {
            state.fail("return value already set".to_string());
            return;
        }
        state.has_return = true;
        state.blocks[0].push(BuildStmt::Plain(ir::Stmt::Return(Some(
            value.into().expr(),
        ))));
    }

    pub fn add(&self, node: impl Into<StmtNode>) {
        self.root.add(node);
    }

    pub fn if_(&self, cond: impl Into<Sym>) -> (Block, Block) {
        self.root.if_(cond)
    }

    pub fn while_(&self, cond: impl Into<Sym>) -> Block {
        self.root.while_(cond)
    }

    pub fn for_(&self, array: impl Into<Sym>) -> (Block, Sym, Sym) {
        self.root.for_(array)
    }

    /// Freezes the context into a validated script. Ill-formed registrations
    /// surface here, synchronously.
    pub fn compile(&self) -> Result<Script, RedisError> {
        let state = self.root.state.borrow();
        if let Some(err) = &state.pending_error {
            return Err(err.clone());
        }
        let script = Script {
            keys: state.keys.clone(),
            args: state.args.clone(),
            locals: state.locals.clone(),
            body: assemble(&state.blocks, 0),
        };
        // Structural and built-in arity validation. Plugin and helper calls
        // are resolved again at registration, where the registry is known.
        script.validate(|kind, name| match kind {
            CallKind::Redis => cmd::redis_command(name).map(|spec| spec.arity),
            CallKind::General => cmd::general_command(name).map(|spec| spec.arity),
            CallKind::Helper | CallKind::Plugin => Some(cmd::Arity::at_least(0)),
        })?;
        Ok(script)
    }
}

fn assemble(blocks: &[Vec<BuildStmt>], id: usize) -> ir::Block {
    let stmts = blocks[id]
        .iter()
        .map(|stmt| match stmt {
            BuildStmt::Plain(stmt) => stmt.clone(),
            BuildStmt::If {
                cond,
                then_id,
                else_id,
            } => ir::Stmt::If {
                cond: cond.clone(),
                then_block: assemble(blocks, *then_id),
                else_block: assemble(blocks, *else_id),
            },
            BuildStmt::While { cond, body_id } => ir::Stmt::While {
                cond: cond.clone(),
                body: assemble(blocks, *body_id),
            },
            BuildStmt::ForEach {
                array,
                index,
                value,
                body_id,
            } => ir::Stmt::ForEach {
                array: array.clone(),
                index: *index,
                value: *value,
                body: assemble(blocks, *body_id),
            },
        })
        .collect();
    ir::Block(stmts)
}
