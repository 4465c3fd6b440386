//! Script compilation and caching. Registration is pure: the IR is
//! validated against the command table and the plugin registry, the Lua
//! program is pre-emitted, and the artifact is cached by the content hash of
//! that program. Registration errors surface here, synchronously, never at
//! run time.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use redsym_core::ir::Script;
use redsym_core::{RedisError, Value};
use redsym_store::Store;

use crate::interp;
use crate::lua;
use crate::plugin::PluginRegistry;

/// A frozen, validated script with its pre-emitted Lua program.
#[derive(Debug)]
pub struct CompiledScript {
    pub script: Script,
    pub lua: String,
    /// Content hash of the Lua text; the registry cache key.
    pub digest: String,
}

#[derive(Default)]
pub struct ScriptRegistry {
    plugins: PluginRegistry,
    cache: HashMap<String, Arc<CompiledScript>>,
}

impl ScriptRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: PluginRegistry::default(),
            cache: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_plugins(plugins: PluginRegistry) -> Self {
        Self {
            plugins,
            cache: HashMap::new(),
        }
    }

    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn plugins_mut(&mut self) -> &mut PluginRegistry {
        &mut self.plugins
    }

    /// Compiles a script, or returns the cached artifact when the same
    /// program was registered before.
    pub fn compile(&mut self, script: Script) -> Result<Arc<CompiledScript>, RedisError> {
        script.validate(|kind, name| self.plugins.resolve(kind, name))?;
        let lua = lua::emit(&script, &self.plugins)?;
        let mut hasher = Sha256::new();
        hasher.update(lua.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        if let Some(cached) = self.cache.get(&digest) {
            return Ok(Arc::clone(cached));
        }
        tracing::debug!(
            target: "redsym",
            digest = %digest,
            keys = script.keys.len(),
            args = script.args.len(),
            "registered script"
        );
        let compiled = Arc::new(CompiledScript {
            script,
            lua,
            digest: digest.clone(),
        });
        self.cache.insert(digest, Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Runs a compiled script on the memory backend and canonicalizes the
    /// result. Errors abort the script and surface as the script kind with
    /// the original message.
    pub fn run_local(
        &self,
        compiled: &CompiledScript,
        store: &mut Store,
        now_ms: u64,
        keys: &[String],
        args: &[Value],
    ) -> Result<Value, RedisError> {
        interp::run(&compiled.script, &self.plugins, store, now_ms, keys, args)
            .map(interp::boundary)
            .map_err(script_error)
    }
}

fn script_error(err: RedisError) -> RedisError {
    match err {
        RedisError::Script(_) => err,
        other => RedisError::Script(other.to_string()),
    }
}

/// Binds named key and argument mappings to the script's positional order.
/// Every declared name must be supplied; unknown names are rejected.
pub fn bind_call(
    script: &Script,
    keys: &HashMap<String, String>,
    args: &HashMap<String, Value>,
) -> Result<(Vec<String>, Vec<Value>), RedisError> {
    let mut key_values = Vec::with_capacity(script.keys.len());
    for name in &script.keys {
        let value = keys
            .get(name)
            .ok_or_else(|| RedisError::Arity(format!("missing key '{name}'")))?;
        key_values.push(value.clone());
    }
    for name in keys.keys() {
        if !script.keys.contains(name) {
            return Err(RedisError::Arity(format!("unknown key '{name}'")));
        }
    }
    let mut arg_values = Vec::with_capacity(script.args.len());
    for name in &script.args {
        let value = args
            .get(name)
            .ok_or_else(|| RedisError::Arity(format!("missing argument '{name}'")))?;
        arg_values.push(value.clone());
    }
    for name in args.keys() {
        if !script.args.contains(name) {
            return Err(RedisError::Arity(format!("unknown argument '{name}'")));
        }
    }
    Ok((key_values, arg_values))
}
