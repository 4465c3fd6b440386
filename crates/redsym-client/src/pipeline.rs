//! Pipelines buffer commands and flush them in order. Results align by
//! enqueue index; a failed slot is recorded in place and later slots still
//! run. On the memory backend the whole flush is one atomic step; on the
//! external backend slots go out sequentially over one logical connection
//! and inherit Redis's non-transactional semantics.

use std::collections::HashMap;
use std::sync::Arc;

use redsym_core::{RedisError, Value};
use redsym_exec::{CompiledScript, bind_call};
use redsym_store::SetOptions;

use crate::command::Command;
use crate::conn::RedisConnection;
use crate::memory::MemoryRuntime;
use crate::script::ScriptHandle;

pub(crate) enum Queued {
    Cmd(Command),
    Script {
        compiled: Arc<CompiledScript>,
        keys: Vec<String>,
        args: Vec<Value>,
    },
    /// A slot that failed at enqueue time (for example a bad binding); the
    /// error is reported at its position.
    Failed(RedisError),
}

pub(crate) enum PipeBackend {
    Memory(MemoryRuntime),
    External(RedisConnection),
}

pub struct Pipeline {
    backend: PipeBackend,
    queue: Vec<Queued>,
}

impl Pipeline {
    pub(crate) fn new(backend: PipeBackend) -> Self {
        Self {
            backend,
            queue: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn push(&mut self, cmd: Command) -> &mut Self {
        self.queue.push(Queued::Cmd(cmd));
        self
    }

    /// Flushes the buffered commands and returns one result per slot, in
    /// enqueue order.
    pub fn execute(&mut self) -> Vec<Result<Value, RedisError>> {
        let queue = std::mem::take(&mut self.queue);
        match &self.backend {
            PipeBackend::Memory(runtime) => runtime.run_pipeline(queue),
            PipeBackend::External(conn) => queue
                .into_iter()
                .map(|slot| match slot {
                    Queued::Cmd(cmd) => conn.dispatch(&cmd),
                    Queued::Script {
                        compiled,
                        keys,
                        args,
                    } => {
                        let invoker = redis::Script::new(&compiled.lua);
                        conn.run_script(&compiled, &invoker, &keys, &args)
                    }
                    Queued::Failed(err) => Err(err),
                })
                .collect(),
        }
    }

    /// Enqueues a registered script; its result lands at this slot.
    pub fn script(
        &mut self,
        handle: &ScriptHandle,
        keys: &HashMap<String, String>,
        args: &HashMap<String, Value>,
    ) -> &mut Self {
        let compiled = Arc::clone(handle.compiled());
        match bind_call(&compiled.script, keys, args) {
            Ok((keys, args)) => self.queue.push(Queued::Script {
                compiled,
                keys,
                args,
            }),
            Err(err) => self.queue.push(Queued::Failed(err)),
        }
        self
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.set_opts(key, value, &SetOptions::default())
    }

    pub fn set_opts(&mut self, key: &str, value: &str, opts: &SetOptions) -> &mut Self {
        self.push(Command::Set {
            key: key.to_string(),
            value: value.to_string(),
            opts: opts.clone(),
        })
    }

    pub fn get(&mut self, key: &str) -> &mut Self {
        self.push(Command::Get {
            key: key.to_string(),
        })
    }

    pub fn incrby(&mut self, key: &str, delta: i64) -> &mut Self {
        self.push(Command::IncrBy {
            key: key.to_string(),
            delta,
        })
    }

    pub fn incrbyfloat(&mut self, key: &str, delta: f64) -> &mut Self {
        self.push(Command::IncrByFloat {
            key: key.to_string(),
            delta,
        })
    }

    pub fn lpush(&mut self, key: &str, values: &[&str]) -> &mut Self {
        self.push(Command::LPush {
            key: key.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        })
    }

    pub fn rpush(&mut self, key: &str, values: &[&str]) -> &mut Self {
        self.push(Command::RPush {
            key: key.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        })
    }

    pub fn lpop(&mut self, key: &str) -> &mut Self {
        self.push(Command::LPop {
            key: key.to_string(),
            count: None,
        })
    }

    pub fn lpop_count(&mut self, key: &str, count: usize) -> &mut Self {
        self.push(Command::LPop {
            key: key.to_string(),
            count: Some(count),
        })
    }

    pub fn rpop(&mut self, key: &str) -> &mut Self {
        self.push(Command::RPop {
            key: key.to_string(),
            count: None,
        })
    }

    pub fn rpop_count(&mut self, key: &str, count: usize) -> &mut Self {
        self.push(Command::RPop {
            key: key.to_string(),
            count: Some(count),
        })
    }

    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> &mut Self {
        self.push(Command::LRange {
            key: key.to_string(),
            start,
            stop,
        })
    }

    pub fn llen(&mut self, key: &str) -> &mut Self {
        self.push(Command::LLen {
            key: key.to_string(),
        })
    }

    pub fn lindex(&mut self, key: &str, index: i64) -> &mut Self {
        self.push(Command::LIndex {
            key: key.to_string(),
            index,
        })
    }

    pub fn hset(&mut self, key: &str, pairs: &[(&str, &str)]) -> &mut Self {
        self.push(Command::HSet {
            key: key.to_string(),
            pairs: pairs
                .iter()
                .map(|(f, v)| (f.to_string(), v.to_string()))
                .collect(),
        })
    }

    pub fn hget(&mut self, key: &str, field: &str) -> &mut Self {
        self.push(Command::HGet {
            key: key.to_string(),
            field: field.to_string(),
        })
    }

    pub fn hdel(&mut self, key: &str, fields: &[&str]) -> &mut Self {
        self.push(Command::HDel {
            key: key.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        })
    }

    pub fn hgetall(&mut self, key: &str) -> &mut Self {
        self.push(Command::HGetAll {
            key: key.to_string(),
        })
    }

    pub fn hkeys(&mut self, key: &str) -> &mut Self {
        self.push(Command::HKeys {
            key: key.to_string(),
        })
    }

    pub fn hvals(&mut self, key: &str) -> &mut Self {
        self.push(Command::HVals {
            key: key.to_string(),
        })
    }

    pub fn hmget(&mut self, key: &str, fields: &[&str]) -> &mut Self {
        self.push(Command::HMGet {
            key: key.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        })
    }

    pub fn hincrby(&mut self, key: &str, field: &str, delta: f64) -> &mut Self {
        self.push(Command::HIncrBy {
            key: key.to_string(),
            field: field.to_string(),
            delta,
        })
    }

    pub fn sadd(&mut self, key: &str, members: &[&str]) -> &mut Self {
        self.push(Command::SAdd {
            key: key.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        })
    }

    pub fn srem(&mut self, key: &str, members: &[&str]) -> &mut Self {
        self.push(Command::SRem {
            key: key.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        })
    }

    pub fn sismember(&mut self, key: &str, member: &str) -> &mut Self {
        self.push(Command::SIsMember {
            key: key.to_string(),
            member: member.to_string(),
        })
    }

    pub fn scard(&mut self, key: &str) -> &mut Self {
        self.push(Command::SCard {
            key: key.to_string(),
        })
    }

    pub fn smembers(&mut self, key: &str) -> &mut Self {
        self.push(Command::SMembers {
            key: key.to_string(),
        })
    }

    pub fn zadd(&mut self, key: &str, entries: &[(&str, f64)]) -> &mut Self {
        self.push(Command::ZAdd {
            key: key.to_string(),
            entries: entries
                .iter()
                .map(|(m, s)| (m.to_string(), *s))
                .collect(),
        })
    }

    pub fn zrange(&mut self, key: &str, start: i64, stop: i64) -> &mut Self {
        self.push(Command::ZRange {
            key: key.to_string(),
            start,
            stop,
        })
    }

    pub fn zpop_min(&mut self, key: &str, count: usize) -> &mut Self {
        self.push(Command::ZPopMin {
            key: key.to_string(),
            count,
        })
    }

    pub fn zpop_max(&mut self, key: &str, count: usize) -> &mut Self {
        self.push(Command::ZPopMax {
            key: key.to_string(),
            count,
        })
    }

    pub fn zcard(&mut self, key: &str) -> &mut Self {
        self.push(Command::ZCard {
            key: key.to_string(),
        })
    }

    pub fn zrem(&mut self, key: &str, members: &[&str]) -> &mut Self {
        self.push(Command::ZRem {
            key: key.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
        })
    }

    pub fn zscore(&mut self, key: &str, member: &str) -> &mut Self {
        self.push(Command::ZScore {
            key: key.to_string(),
            member: member.to_string(),
        })
    }

    pub fn del(&mut self, keys: &[&str]) -> &mut Self {
        self.push(Command::Del {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
    }

    pub fn exists(&mut self, keys: &[&str]) -> &mut Self {
        self.push(Command::Exists {
            keys: keys.iter().map(|k| k.to_string()).collect(),
        })
    }

    pub fn key_type(&mut self, key: &str) -> &mut Self {
        self.push(Command::Type {
            key: key.to_string(),
        })
    }

    pub fn expire(&mut self, key: &str, seconds: i64) -> &mut Self {
        self.push(Command::Expire {
            key: key.to_string(),
            seconds,
        })
    }

    pub fn pexpire(&mut self, key: &str, milliseconds: i64) -> &mut Self {
        self.push(Command::PExpire {
            key: key.to_string(),
            milliseconds,
        })
    }

    pub fn persist(&mut self, key: &str) -> &mut Self {
        self.push(Command::Persist {
            key: key.to_string(),
        })
    }

    pub fn ttl(&mut self, key: &str) -> &mut Self {
        self.push(Command::Ttl {
            key: key.to_string(),
        })
    }

    pub fn pttl(&mut self, key: &str) -> &mut Self {
        self.push(Command::PTtl {
            key: key.to_string(),
        })
    }

    pub fn flushall(&mut self) -> &mut Self {
        self.push(Command::FlushAll)
    }
}
