#![forbid(unsafe_code)]

//! The symbolic builder: a host-side API for composing scripts that compile
//! to the execution-graph IR. Building is pure; no engine is touched until
//! the compiled script is registered with a runtime.

mod ctx;
mod objs;
mod sym;

pub use ctx::{Block, FnContext, LocalHandle, StmtNode, break_loop, continue_loop};
pub use objs::{
    LogLevel, RedisHash, RedisList, RedisSet, RedisSortedSet, RedisVar, SetScriptOptions,
    call_plugin, cjson_decode, cjson_encode, concat, log, redis_fn, string_find, to_int_str,
    to_num, to_str, type_of,
};
pub use sym::Sym;
