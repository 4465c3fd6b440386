#![forbid(unsafe_code)]

//! The client facade: one Redis-like surface backed by either the in-process
//! memory engine or a real Redis server. Direct commands, pipelines, and
//! registered scripts behave identically on both backends after boundary
//! decoding.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use redsym_core::{RedisError, Value};
use redsym_exec::ScriptRegistry;
use redsym_script::FnContext;

pub mod command;
pub mod conn;
pub mod memory;
pub mod pipeline;
pub mod script;

pub use command::Command;
pub use conn::{RedisConfig, RedisConnection};
pub use memory::MemoryRuntime;
pub use pipeline::Pipeline;
pub use redsym_core::cmd::SetMode;
pub use redsym_store::SetOptions;
pub use script::{ScriptHandle, args_of, keys_of};

use pipeline::PipeBackend;
use script::HandleBackend;

#[derive(Clone)]
enum Backend {
    Memory(MemoryRuntime),
    External {
        conn: RedisConnection,
        registry: Rc<RefCell<ScriptRegistry>>,
    },
}

/// A client bound to one backend. Cloning shares the backend.
#[derive(Clone)]
pub struct Client {
    backend: Backend,
}

impl Client {
    /// An in-process client with a fresh engine.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryRuntime::new()),
        }
    }

    /// An in-process client with a pre-populated plugin registry.
    #[must_use]
    pub fn memory_with_registry(registry: ScriptRegistry) -> Self {
        Self {
            backend: Backend::Memory(MemoryRuntime::with_registry(registry)),
        }
    }

    /// A client talking to a real Redis server.
    pub fn external(cfg: &RedisConfig) -> Result<Self, RedisError> {
        Ok(Self {
            backend: Backend::External {
                conn: RedisConnection::connect(cfg)?,
                registry: Rc::new(RefCell::new(ScriptRegistry::new())),
            },
        })
    }

    /// A client talking to a real Redis server, with plugins.
    pub fn external_with_registry(
        cfg: &RedisConfig,
        registry: ScriptRegistry,
    ) -> Result<Self, RedisError> {
        Ok(Self {
            backend: Backend::External {
                conn: RedisConnection::connect(cfg)?,
                registry: Rc::new(RefCell::new(registry)),
            },
        })
    }

    fn dispatch(&self, cmd: Command) -> Result<Value, RedisError> {
        match &self.backend {
            Backend::Memory(runtime) => runtime.dispatch(&cmd),
            Backend::External { conn, .. } => conn.dispatch(&cmd),
        }
    }

    /// Registers a script built with a [`FnContext`]. Validation, emission,
    /// and caching happen here; the returned handle is reusable.
    pub fn register_script(&self, ctx: &FnContext) -> Result<ScriptHandle, RedisError> {
        let script = ctx.compile()?;
        match &self.backend {
            Backend::Memory(runtime) => {
                let compiled = runtime.compile(script)?;
                Ok(ScriptHandle::new(HandleBackend::Memory {
                    runtime: runtime.clone(),
                    compiled,
                }))
            }
            Backend::External { conn, registry } => {
                let compiled = registry.borrow_mut().compile(script)?;
                let invoker = redis::Script::new(&compiled.lua);
                Ok(ScriptHandle::new(HandleBackend::External {
                    conn: conn.clone(),
                    compiled,
                    invoker,
                }))
            }
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        match &self.backend {
            Backend::Memory(runtime) => Pipeline::new(PipeBackend::Memory(runtime.clone())),
            Backend::External { conn, .. } => Pipeline::new(PipeBackend::External(conn.clone())),
        }
    }

    // ── String commands ─────────────────────────────────────────────────

    /// Plain SET; returns whether the value was stored.
    pub fn set(&self, key: &str, value: &str) -> Result<bool, RedisError> {
        self.set_opts(key, value, &SetOptions::default())
    }

    pub fn set_opts(&self, key: &str, value: &str, opts: &SetOptions) -> Result<bool, RedisError> {
        let mut opts = opts.clone();
        opts.return_previous = false;
        let res = self.dispatch(Command::Set {
            key: key.to_string(),
            value: value.to_string(),
            opts,
        })?;
        Ok(expect_bool(res))
    }

    /// SET with the GET option; returns the previous value.
    pub fn set_get(
        &self,
        key: &str,
        value: &str,
        opts: &SetOptions,
    ) -> Result<Option<String>, RedisError> {
        let mut opts = opts.clone();
        opts.return_previous = true;
        let res = self.dispatch(Command::Set {
            key: key.to_string(),
            value: value.to_string(),
            opts,
        })?;
        Ok(opt_str(res))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, RedisError> {
        let res = self.dispatch(Command::Get {
            key: key.to_string(),
        })?;
        Ok(opt_str(res))
    }

    pub fn incrby(&self, key: &str, delta: i64) -> Result<i64, RedisError> {
        let res = self.dispatch(Command::IncrBy {
            key: key.to_string(),
            delta,
        })?;
        Ok(expect_int(res))
    }

    pub fn incrbyfloat(&self, key: &str, delta: f64) -> Result<f64, RedisError> {
        let res = self.dispatch(Command::IncrByFloat {
            key: key.to_string(),
            delta,
        })?;
        Ok(expect_float(res))
    }

    // ── List commands ───────────────────────────────────────────────────

    pub fn lpush(&self, key: &str, values: &[&str]) -> Result<usize, RedisError> {
        let res = self.dispatch(Command::LPush {
            key: key.to_string(),
            values: owned(values),
        })?;
        Ok(expect_int(res) as usize)
    }

    pub fn rpush(&self, key: &str, values: &[&str]) -> Result<usize, RedisError> {
        let res = self.dispatch(Command::RPush {
            key: key.to_string(),
            values: owned(values),
        })?;
        Ok(expect_int(res) as usize)
    }

    pub fn lpop(&self, key: &str) -> Result<Option<String>, RedisError> {
        let res = self.dispatch(Command::LPop {
            key: key.to_string(),
            count: None,
        })?;
        Ok(opt_str(res))
    }

    /// Pops up to `count` values; `None` when nothing was popped.
    pub fn lpop_count(&self, key: &str, count: usize) -> Result<Option<Vec<String>>, RedisError> {
        let res = self.dispatch(Command::LPop {
            key: key.to_string(),
            count: Some(count),
        })?;
        Ok(opt_str_list(res))
    }

    pub fn rpop(&self, key: &str) -> Result<Option<String>, RedisError> {
        let res = self.dispatch(Command::RPop {
            key: key.to_string(),
            count: None,
        })?;
        Ok(opt_str(res))
    }

    pub fn rpop_count(&self, key: &str, count: usize) -> Result<Option<Vec<String>>, RedisError> {
        let res = self.dispatch(Command::RPop {
            key: key.to_string(),
            count: Some(count),
        })?;
        Ok(opt_str_list(res))
    }

    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, RedisError> {
        let res = self.dispatch(Command::LRange {
            key: key.to_string(),
            start,
            stop,
        })?;
        Ok(str_list(res))
    }

    pub fn llen(&self, key: &str) -> Result<usize, RedisError> {
        let res = self.dispatch(Command::LLen {
            key: key.to_string(),
        })?;
        Ok(expect_int(res) as usize)
    }

    pub fn lindex(&self, key: &str, index: i64) -> Result<Option<String>, RedisError> {
        let res = self.dispatch(Command::LIndex {
            key: key.to_string(),
            index,
        })?;
        Ok(opt_str(res))
    }

    // ── Hash commands ───────────────────────────────────────────────────

    pub fn hset(&self, key: &str, pairs: &[(&str, &str)]) -> Result<u64, RedisError> {
        let res = self.dispatch(Command::HSet {
            key: key.to_string(),
            pairs: pairs
                .iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect(),
        })?;
        Ok(expect_int(res) as u64)
    }

    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>, RedisError> {
        let res = self.dispatch(Command::HGet {
            key: key.to_string(),
            field: field.to_string(),
        })?;
        Ok(opt_str(res))
    }

    pub fn hdel(&self, key: &str, fields: &[&str]) -> Result<u64, RedisError> {
        let res = self.dispatch(Command::HDel {
            key: key.to_string(),
            fields: owned(fields),
        })?;
        Ok(expect_int(res) as u64)
    }

    pub fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, RedisError> {
        let res = self.dispatch(Command::HGetAll {
            key: key.to_string(),
        })?;
        Ok(str_map(res))
    }

    pub fn hkeys(&self, key: &str) -> Result<Vec<String>, RedisError> {
        let res = self.dispatch(Command::HKeys {
            key: key.to_string(),
        })?;
        Ok(str_list(res))
    }

    pub fn hvals(&self, key: &str) -> Result<Vec<String>, RedisError> {
        let res = self.dispatch(Command::HVals {
            key: key.to_string(),
        })?;
        Ok(str_list(res))
    }

    /// Values aligned with the requested fields; `None` for missing fields.
    pub fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, RedisError> {
        let res = self.dispatch(Command::HMGet {
            key: key.to_string(),
            fields: owned(fields),
        })?;
        Ok(opt_list(res))
    }

    pub fn hincrby(&self, key: &str, field: &str, delta: f64) -> Result<f64, RedisError> {
        let res = self.dispatch(Command::HIncrBy {
            key: key.to_string(),
            field: field.to_string(),
            delta,
        })?;
        Ok(expect_float(res))
    }

    // ── Set commands ────────────────────────────────────────────────────

    pub fn sadd(&self, key: &str, members: &[&str]) -> Result<u64, RedisError> {
        let res = self.dispatch(Command::SAdd {
            key: key.to_string(),
            members: owned(members),
        })?;
        Ok(expect_int(res) as u64)
    }

    pub fn srem(&self, key: &str, members: &[&str]) -> Result<u64, RedisError> {
        let res = self.dispatch(Command::SRem {
            key: key.to_string(),
            members: owned(members),
        })?;
        Ok(expect_int(res) as u64)
    }

    pub fn sismember(&self, key: &str, member: &str) -> Result<bool, RedisError> {
        let res = self.dispatch(Command::SIsMember {
            key: key.to_string(),
            member: member.to_string(),
        })?;
        Ok(expect_bool(res))
    }

    pub fn scard(&self, key: &str) -> Result<usize, RedisError> {
        let res = self.dispatch(Command::SCard {
            key: key.to_string(),
        })?;
        Ok(expect_int(res) as usize)
    }

    /// Members in sorted order on every backend.
    pub fn smembers(&self, key: &str) -> Result<Vec<String>, RedisError> {
        let res = self.dispatch(Command::SMembers {
            key: key.to_string(),
        })?;
        Ok(str_list(res))
    }

    // ── Sorted-set commands ─────────────────────────────────────────────

    pub fn zadd(&self, key: &str, entries: &[(&str, f64)]) -> Result<u64, RedisError> {
        let res = self.dispatch(Command::ZAdd {
            key: key.to_string(),
            entries: entries
                .iter()
                .map(|(m, s)| (m.to_string(), *s))
                .collect(),
        })?;
        Ok(expect_int(res) as u64)
    }

    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, RedisError> {
        let res = self.dispatch(Command::ZRange {
            key: key.to_string(),
            start,
            stop,
        })?;
        Ok(str_list(res))
    }

    pub fn zpop_min(&self, key: &str, count: usize) -> Result<Vec<(String, f64)>, RedisError> {
        let res = self.dispatch(Command::ZPopMin {
            key: key.to_string(),
            count,
        })?;
        Ok(pair_list(res))
    }

    pub fn zpop_max(&self, key: &str, count: usize) -> Result<Vec<(String, f64)>, RedisError> {
        let res = self.dispatch(Command::ZPopMax {
            key: key.to_string(),
            count,
        })?;
        Ok(pair_list(res))
    }

    pub fn zcard(&self, key: &str) -> Result<usize, RedisError> {
        let res = self.dispatch(Command::ZCard {
            key: key.to_string(),
        })?;
        Ok(expect_int(res) as usize)
    }

    pub fn zrem(&self, key: &str, members: &[&str]) -> Result<u64, RedisError> {
        let res = self.dispatch(Command::ZRem {
            key: key.to_string(),
            members: owned(members),
        })?;
        Ok(expect_int(res) as u64)
    }

    pub fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, RedisError> {
        let res = self.dispatch(Command::ZScore {
            key: key.to_string(),
            member: member.to_string(),
        })?;
        match res {
            Value::Null => Ok(None),
            Value::Float(f) => Ok(Some(f)),
            Value::Int(n) => Ok(Some(n as f64)),
            other => unreachable!("zscore reply shape: {other:?}"),
        }
    }

    // ── Key commands ────────────────────────────────────────────────────

    pub fn del(&self, keys: &[&str]) -> Result<u64, RedisError> {
        let res = self.dispatch(Command::Del { keys: owned(keys) })?;
        Ok(expect_int(res) as u64)
    }

    pub fn exists(&self, keys: &[&str]) -> Result<u64, RedisError> {
        let res = self.dispatch(Command::Exists { keys: owned(keys) })?;
        Ok(expect_int(res) as u64)
    }

    /// The type name of a key, or `None` when absent.
    pub fn key_type(&self, key: &str) -> Result<Option<String>, RedisError> {
        let res = self.dispatch(Command::Type {
            key: key.to_string(),
        })?;
        Ok(opt_str(res))
    }

    pub fn keys(&self, pattern: Option<&str>) -> Result<Vec<String>, RedisError> {
        let res = self.dispatch(Command::Keys {
            pattern: pattern.map(str::to_string),
        })?;
        Ok(str_list(res))
    }

    /// One scan step. Start with cursor `"0"`; the scan is done when the
    /// returned cursor is `"0"` again. Cursor values are opaque.
    pub fn scan(
        &self,
        cursor: &str,
        pattern: Option<&str>,
        count: Option<usize>,
    ) -> Result<(String, Vec<String>), RedisError> {
        let res = self.dispatch(Command::Scan {
            cursor: cursor.to_string(),
            pattern: pattern.map(str::to_string),
            count,
        })?;
        let Value::List(mut parts) = res else {
            unreachable!("scan reply shape");
        };
        let keys = str_list(parts.pop().unwrap_or(Value::Null));
        let next = opt_str(parts.pop().unwrap_or(Value::Null)).unwrap_or_default();
        Ok((next, keys))
    }

    pub fn expire(&self, key: &str, seconds: i64) -> Result<bool, RedisError> {
        let res = self.dispatch(Command::Expire {
            key: key.to_string(),
            seconds,
        })?;
        Ok(expect_bool(res))
    }

    pub fn pexpire(&self, key: &str, milliseconds: i64) -> Result<bool, RedisError> {
        let res = self.dispatch(Command::PExpire {
            key: key.to_string(),
            milliseconds,
        })?;
        Ok(expect_bool(res))
    }

    pub fn expire_at(&self, key: &str, at_seconds: i64) -> Result<bool, RedisError> {
        let res = self.dispatch(Command::ExpireAt {
            key: key.to_string(),
            at_seconds,
        })?;
        Ok(expect_bool(res))
    }

    pub fn pexpire_at(&self, key: &str, at_milliseconds: i64) -> Result<bool, RedisError> {
        let res = self.dispatch(Command::PExpireAt {
            key: key.to_string(),
            at_milliseconds,
        })?;
        Ok(expect_bool(res))
    }

    pub fn persist(&self, key: &str) -> Result<bool, RedisError> {
        let res = self.dispatch(Command::Persist {
            key: key.to_string(),
        })?;
        Ok(expect_bool(res))
    }

    /// Seconds to live: `-2` missing, `-1` no expiry.
    pub fn ttl(&self, key: &str) -> Result<i64, RedisError> {
        let res = self.dispatch(Command::Ttl {
            key: key.to_string(),
        })?;
        Ok(expect_int(res))
    }

    pub fn pttl(&self, key: &str) -> Result<i64, RedisError> {
        let res = self.dispatch(Command::PTtl {
            key: key.to_string(),
        })?;
        Ok(expect_int(res))
    }

    pub fn flushall(&self) -> Result<(), RedisError> {
        self.dispatch(Command::FlushAll)?;
        Ok(())
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn expect_bool(value: Value) -> bool {
    match value {
        Value::Bool(b) => b,
        other => unreachable!("boolean reply shape: {other:?}"),
    }
}

fn expect_int(value: Value) -> i64 {
    match value {
        Value::Int(n) => n,
        other => unreachable!("integer reply shape: {other:?}"),
    }
}

fn expect_float(value: Value) -> f64 {
    match value {
        Value::Float(f) => f,
        Value::Int(n) => n as f64,
        other => unreachable!("float reply shape: {other:?}"),
    }
}

fn opt_str(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Str(s) => Some(s),
        other => unreachable!("string reply shape: {other:?}"),
    }
}

fn str_list(value: Value) -> Vec<String> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Str(s) => s,
                other => unreachable!("string list reply shape: {other:?}"),
            })
            .collect(),
        other => unreachable!("list reply shape: {other:?}"),
    }
}

fn opt_str_list(value: Value) -> Option<Vec<String>> {
    match value {
        Value::Null => None,
        list @ Value::List(_) => Some(str_list(list)),
        other => unreachable!("list reply shape: {other:?}"),
    }
}

fn opt_list(value: Value) -> Vec<Option<String>> {
    match value {
        Value::List(items) => items.into_iter().map(opt_str).collect(),
        other => unreachable!("list reply shape: {other:?}"),
    }
}

fn str_map(value: Value) -> HashMap<String, String> {
    match value {
        Value::Map(map) => map
            .into_iter()
            .map(|(field, value)| match value {
                Value::Str(s) => (field, s),
                other => unreachable!("map reply shape: {other:?}"),
            })
            .collect(),
        other => unreachable!("map reply shape: {other:?}"),
    }
}

fn pair_list(value: Value) -> Vec<(String, f64)> {
    match value {
        Value::List(items) => items
            .into_iter()
            .map(|pair| match pair {
                Value::List(parts) if parts.len() == 2 => {
                    let mut it = parts.into_iter();
                    let member = opt_str(it.next().unwrap_or(Value::Null)).unwrap_or_default();
                    let score = match it.next() {
                        Some(Value::Float(f)) => f,
                        Some(Value::Int(n)) => n as f64,
                        other => unreachable!("score reply shape: {other:?}"),
                    };
                    (member, score)
                }
                other => unreachable!("pair reply shape: {other:?}"),
            })
            .collect(),
        other => unreachable!("pair list reply shape: {other:?}"),
    }
}
