#![forbid(unsafe_code)]

//! Script execution for both backends: the IR interpreter running directly
//! against the in-memory engine, the IR-to-Lua emitter feeding `EVAL` on a
//! real server, and the registry that compiles, validates, and caches scripts
//! by content hash.

pub mod interp;
pub mod lua;
pub mod plugin;
pub mod registry;

mod gfun;
mod patch;
mod rfun;

pub use interp::boundary;
pub use plugin::{EmitPatch, PluginFunction, PluginRegistry};
pub use registry::{CompiledScript, ScriptRegistry, bind_call};
pub use rfun::redis_call;
