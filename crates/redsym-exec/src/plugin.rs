//! The plugin registry. It is builder-scoped: a registry travels with script
//! registration instead of living in process-global state. Plugins declare a
//! name, an arity, an interpreter implementation, and an emitter rewrite so a
//! script using them runs unchanged on both backends.

use std::collections::HashMap;
use std::rc::Rc;

use redsym_core::cmd::Arity;
use redsym_core::ir::{CallKind, Expr};
use redsym_core::{RedisError, Value};
use redsym_store::Store;

use crate::patch;

/// A user-defined script operation, callable as `Call(Plugin, name, args)`.
pub trait PluginFunction {
    fn name(&self) -> &'static str;

    fn arity(&self) -> Arity;

    /// Runs the operation on the memory backend.
    fn call(&self, store: &mut Store, now_ms: u64, args: &[Value])
    -> Result<Value, RedisError>;

    /// Rewrites the call into emittable IR for the Lua backend. The result
    /// must consist of redis, general, and helper calls only.
    fn emit(&self, args: Vec<Expr>, is_expr_stmt: bool) -> Expr;
}

/// Rewrites a call expression just before Lua emission. `is_expr_stmt` is set
/// when the call is the whole statement; Lua rejects non-call expressions in
/// that position, so most patches pass the call through unchanged there.
pub trait EmitPatch {
    fn names(&self) -> Vec<&'static str>;

    fn patch(&self, name: &str, call: Expr, is_expr_stmt: bool) -> Expr;
}

pub struct PluginRegistry {
    plugins: HashMap<&'static str, Rc<dyn PluginFunction>>,
    redis_patches: HashMap<&'static str, Rc<dyn EmitPatch>>,
    general_patches: HashMap<&'static str, Rc<dyn EmitPatch>>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        let mut redis_patches: HashMap<&'static str, Rc<dyn EmitPatch>> = HashMap::new();
        for p in patch::default_redis_patches() {
            for name in p.names() {
                redis_patches.insert(name, Rc::clone(&p));
            }
        }
        let mut general_patches: HashMap<&'static str, Rc<dyn EmitPatch>> = HashMap::new();
        for p in patch::default_general_patches() {
            for name in p.names() {
                general_patches.insert(name, Rc::clone(&p));
            }
        }
        Self {
            plugins: HashMap::new(),
            redis_patches,
            general_patches,
        }
    }
}

impl PluginRegistry {
    /// Registers a plugin operation. Names colliding with built-in redis or
    /// general operations, or with an already registered plugin, are
    /// rejected.
    pub fn add_plugin(&mut self, plugin: Rc<dyn PluginFunction>) -> Result<(), RedisError> {
        let name = plugin.name();
        if redsym_core::cmd::redis_command(name).is_some()
            || redsym_core::cmd::general_command(name).is_some()
        {
            return Err(RedisError::parse(format!(
                "plugin name '{name}' shadows a built-in operation"
            )));
        }
        if self.plugins.contains_key(name) {
            return Err(RedisError::parse(format!(
                "duplicate plugin definition: {name}"
            )));
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Replaces or installs an emission patch for a redis command.
    pub fn add_redis_patch(&mut self, patch: Rc<dyn EmitPatch>) {
        for name in patch.names() {
            self.redis_patches.insert(name, Rc::clone(&patch));
        }
    }

    #[must_use]
    pub fn plugin(&self, name: &str) -> Option<&Rc<dyn PluginFunction>> {
        self.plugins.get(name)
    }

    #[must_use]
    pub fn redis_patch(&self, name: &str) -> Option<&Rc<dyn EmitPatch>> {
        self.redis_patches.get(name)
    }

    #[must_use]
    pub fn general_patch(&self, name: &str) -> Option<&Rc<dyn EmitPatch>> {
        self.general_patches.get(name)
    }

    /// Resolves an operation for script validation. Redis and general ops
    /// come from the command table, plugin ops from this registry, helper
    /// ops from the emitter's helper library.
    #[must_use]
    pub fn resolve(&self, kind: CallKind, name: &str) -> Option<Arity> {
        match kind {
            CallKind::Redis => redsym_core::cmd::redis_command(name).map(|spec| spec.arity),
            CallKind::General => redsym_core::cmd::general_command(name).map(|spec| spec.arity),
            CallKind::Plugin => self.plugins.get(name).map(|plugin| plugin.arity()),
            CallKind::Helper => patch::helper_arity(name),
        }
    }
}
