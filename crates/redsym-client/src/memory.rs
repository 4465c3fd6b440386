//! The memory backend runtime: the engine and the script registry behind
//! shared cells, with the wall clock threaded as `now_ms`. One dispatched
//! command, one script run, or one pipeline flush is a single atomic step;
//! the library is single-threaded cooperative and never blocks.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use redsym_core::{RedisError, Value};
use redsym_exec::{CompiledScript, ScriptRegistry};
use redsym_store::Store;

use crate::command::{Command, apply};

#[derive(Clone)]
pub struct MemoryRuntime {
    store: Rc<RefCell<Store>>,
    registry: Rc<RefCell<ScriptRegistry>>,
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuntime {
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: Rc::new(RefCell::new(Store::new())),
            registry: Rc::new(RefCell::new(ScriptRegistry::new())),
        }
    }

    #[must_use]
    pub fn with_registry(registry: ScriptRegistry) -> Self {
        Self {
            store: Rc::new(RefCell::new(Store::new())),
            registry: Rc::new(RefCell::new(registry)),
        }
    }

    pub(crate) fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    pub fn dispatch(&self, cmd: &Command) -> Result<Value, RedisError> {
        let mut store = self.store.borrow_mut();
        apply(&mut store, Self::now_ms(), cmd)
    }

    /// Flushes a pipeline: every slot runs in order under one engine borrow,
    /// failures are recorded in place and later slots still execute.
    pub(crate) fn run_pipeline(
        &self,
        queue: Vec<crate::pipeline::Queued>,
    ) -> Vec<Result<Value, RedisError>> {
        let mut store = self.store.borrow_mut();
        let registry = self.registry.borrow();
        let now_ms = Self::now_ms();
        queue
            .into_iter()
            .map(|slot| match slot {
                crate::pipeline::Queued::Cmd(cmd) => apply(&mut store, now_ms, &cmd),
                crate::pipeline::Queued::Script {
                    compiled,
                    keys,
                    args,
                } => registry.run_local(&compiled, &mut store, now_ms, &keys, &args),
                crate::pipeline::Queued::Failed(err) => Err(err),
            })
            .collect()
    }

    pub(crate) fn compile(
        &self,
        script: redsym_core::ir::Script,
    ) -> Result<std::sync::Arc<CompiledScript>, RedisError> {
        self.registry.borrow_mut().compile(script)
    }

    pub(crate) fn run_script(
        &self,
        compiled: &CompiledScript,
        keys: &[String],
        args: &[Value],
    ) -> Result<Value, RedisError> {
        let mut store = self.store.borrow_mut();
        self.registry
            .borrow()
            .run_local(compiled, &mut store, Self::now_ms(), keys, args)
    }
}
