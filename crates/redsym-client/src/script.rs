//! The callable handle a registered script compiles into. The handle owns
//! the compiled IR and the emitted Lua and is reused across calls; keys and
//! arguments bind by name on every run.

use std::collections::HashMap;
use std::sync::Arc;

use redsym_core::{RedisError, Value};
use redsym_exec::{CompiledScript, bind_call};

use crate::conn::RedisConnection;
use crate::memory::MemoryRuntime;

pub(crate) enum HandleBackend {
    Memory {
        runtime: MemoryRuntime,
        compiled: Arc<CompiledScript>,
    },
    External {
        conn: RedisConnection,
        compiled: Arc<CompiledScript>,
        invoker: redis::Script,
    },
}

pub struct ScriptHandle {
    backend: HandleBackend,
}

impl ScriptHandle {
    pub(crate) fn new(backend: HandleBackend) -> Self {
        Self { backend }
    }

    pub(crate) fn compiled(&self) -> &Arc<CompiledScript> {
        match &self.backend {
            HandleBackend::Memory { compiled, .. } | HandleBackend::External { compiled, .. } => {
                compiled
            }
        }
    }

    /// The emitted Lua program. Useful as a debugging hook.
    #[must_use]
    pub fn lua(&self) -> &str {
        &self.compiled().lua
    }

    /// The content hash of the emitted program.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.compiled().digest
    }

    /// Executes the script. Key and argument mappings are by name; every
    /// declared name must be supplied.
    pub fn run(
        &self,
        keys: &HashMap<String, String>,
        args: &HashMap<String, Value>,
    ) -> Result<Value, RedisError> {
        let (key_values, arg_values) = bind_call(&self.compiled().script, keys, args)?;
        match &self.backend {
            HandleBackend::Memory { runtime, compiled } => {
                runtime.run_script(compiled, &key_values, &arg_values)
            }
            HandleBackend::External {
                conn,
                compiled,
                invoker,
            } => conn.run_script(compiled, invoker, &key_values, &arg_values),
        }
    }
}

/// Convenience constructors for the name mappings `run` expects.
#[must_use]
pub fn keys_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(name, key)| (name.to_string(), key.to_string()))
        .collect()
}

#[must_use]
pub fn args_of(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
