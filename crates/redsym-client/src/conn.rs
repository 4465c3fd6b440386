//! The external backend: a thin adapter over the `redis` crate. Every key is
//! prefixed client-side, command replies are decoded into the same `Value`
//! shapes the memory backend produces, and scripts go out as
//! `EVALSHA sha numkeys key… json_of_args` with the `EVAL` fallback on
//! `NOSCRIPT` handled by `redis::Script`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use redsym_core::{RedisError, Value};
use redsym_exec::{CompiledScript, boundary};
use redsym_store::SetOptions;

use crate::command::Command;

/// Connection parameters of the external backend. `prefix` is prepended to
/// every key this client sends, giving a virtual namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub passwd: String,
    pub prefix: String,
}

impl RedisConfig {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            passwd: String::new(),
            prefix: String::new(),
        }
    }

    fn url(&self) -> String {
        if self.passwd.is_empty() {
            format!("redis://{}:{}/", self.host, self.port)
        } else {
            format!("redis://:{}@{}:{}/", self.passwd, self.host, self.port)
        }
    }
}

#[derive(Clone)]
pub struct RedisConnection {
    client: redis::Client,
    prefix: String,
}

impl RedisConnection {
    pub fn connect(cfg: &RedisConfig) -> Result<Self, RedisError> {
        let client = redis::Client::open(cfg.url())
            .map_err(|err| RedisError::Connection(err.to_string()))?;
        Ok(Self {
            client,
            prefix: cfg.prefix.clone(),
        })
    }

    fn conn(&self) -> Result<redis::Connection, RedisError> {
        self.client
            .get_connection()
            .map_err(|err| RedisError::Connection(err.to_string()))
    }

    /// The key as sent on the wire.
    #[must_use]
    pub fn with_prefix(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn strip_prefix(&self, key: String) -> String {
        match key.strip_prefix(&self.prefix) {
            Some(stripped) => stripped.to_string(),
            None => key,
        }
    }

    pub fn dispatch(&self, cmd: &Command) -> Result<Value, RedisError> {
        let mut conn = self.conn()?;
        self.run_wire(&mut conn, cmd)
    }

    fn run_wire(&self, conn: &mut redis::Connection, cmd: &Command) -> Result<Value, RedisError> {
        match cmd {
            Command::Set { key, value, opts } => {
                let mut c = redis::cmd("SET");
                c.arg(self.with_prefix(key)).arg(value);
                set_flags(&mut c, opts);
                let reply: Option<String> = c.query(conn).map_err(wire_err)?;
                if opts.return_previous {
                    Ok(Value::from(reply))
                } else {
                    Ok(Value::Bool(reply.is_some()))
                }
            }
            Command::Get { key } => {
                let reply: Option<String> = redis::cmd("GET")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::from(reply))
            }
            Command::IncrBy { key, delta } => {
                let reply: i64 = redis::cmd("INCRBY")
                    .arg(self.with_prefix(key))
                    .arg(delta)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::IncrByFloat { key, delta } => {
                let reply: f64 = redis::cmd("INCRBYFLOAT")
                    .arg(self.with_prefix(key))
                    .arg(delta)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Float(reply))
            }
            Command::LPush { key, values } => {
                let reply: i64 = redis::cmd("LPUSH")
                    .arg(self.with_prefix(key))
                    .arg(values)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::RPush { key, values } => {
                let reply: i64 = redis::cmd("RPUSH")
                    .arg(self.with_prefix(key))
                    .arg(values)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::LPop { key, count } => self.pop(conn, "LPOP", key, *count),
            Command::RPop { key, count } => self.pop(conn, "RPOP", key, *count),
            Command::LRange { key, start, stop } => {
                let reply: Vec<String> = redis::cmd("LRANGE")
                    .arg(self.with_prefix(key))
                    .arg(start)
                    .arg(stop)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::from(reply))
            }
            Command::LLen { key } => {
                let reply: i64 = redis::cmd("LLEN")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::LIndex { key, index } => {
                let reply: Option<String> = redis::cmd("LINDEX")
                    .arg(self.with_prefix(key))
                    .arg(index)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::from(reply))
            }
            Command::HSet { key, pairs } => {
                let mut c = redis::cmd("HSET");
                c.arg(self.with_prefix(key));
                for (field, value) in pairs {
                    c.arg(field).arg(value);
                }
                let reply: i64 = c.query(conn).map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::HGet { key, field } => {
                let reply: Option<String> = redis::cmd("HGET")
                    .arg(self.with_prefix(key))
                    .arg(field)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::from(reply))
            }
            Command::HDel { key, fields } => {
                let reply: i64 = redis::cmd("HDEL")
                    .arg(self.with_prefix(key))
                    .arg(fields)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::HGetAll { key } => {
                let reply: HashMap<String, String> = redis::cmd("HGETALL")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                let map: BTreeMap<String, Value> = reply
                    .into_iter()
                    .map(|(field, value)| (field, Value::Str(value)))
                    .collect();
                Ok(Value::Map(map))
            }
            Command::HKeys { key } => {
                let mut reply: Vec<String> = redis::cmd("HKEYS")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                reply.sort();
                Ok(Value::from(reply))
            }
            Command::HVals { key } => {
                let mut reply: Vec<String> = redis::cmd("HVALS")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                reply.sort();
                Ok(Value::from(reply))
            }
            Command::HMGet { key, fields } => {
                let reply: Vec<Option<String>> = redis::cmd("HMGET")
                    .arg(self.with_prefix(key))
                    .arg(fields)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::List(reply.into_iter().map(Value::from).collect()))
            }
            Command::HIncrBy { key, field, delta } => {
                let reply: f64 = redis::cmd("HINCRBYFLOAT")
                    .arg(self.with_prefix(key))
                    .arg(field)
                    .arg(delta)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Float(reply))
            }
            Command::SAdd { key, members } => {
                let reply: i64 = redis::cmd("SADD")
                    .arg(self.with_prefix(key))
                    .arg(members)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::SRem { key, members } => {
                let reply: i64 = redis::cmd("SREM")
                    .arg(self.with_prefix(key))
                    .arg(members)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::SIsMember { key, member } => {
                let reply: bool = redis::cmd("SISMEMBER")
                    .arg(self.with_prefix(key))
                    .arg(member)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Bool(reply))
            }
            Command::SCard { key } => {
                let reply: i64 = redis::cmd("SCARD")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::SMembers { key } => {
                let mut reply: Vec<String> = redis::cmd("SMEMBERS")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                reply.sort();
                Ok(Value::from(reply))
            }
            Command::ZAdd { key, entries } => {
                let mut c = redis::cmd("ZADD");
                c.arg(self.with_prefix(key));
                for (member, score) in entries {
                    c.arg(score).arg(member);
                }
                let reply: i64 = c.query(conn).map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::ZRange { key, start, stop } => {
                let reply: Vec<String> = redis::cmd("ZRANGE")
                    .arg(self.with_prefix(key))
                    .arg(start)
                    .arg(stop)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::from(reply))
            }
            Command::ZPopMin { key, count } => self.zpop(conn, "ZPOPMIN", key, *count),
            Command::ZPopMax { key, count } => self.zpop(conn, "ZPOPMAX", key, *count),
            Command::ZCard { key } => {
                let reply: i64 = redis::cmd("ZCARD")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::ZRem { key, members } => {
                let reply: i64 = redis::cmd("ZREM")
                    .arg(self.with_prefix(key))
                    .arg(members)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::ZScore { key, member } => {
                let reply: Option<f64> = redis::cmd("ZSCORE")
                    .arg(self.with_prefix(key))
                    .arg(member)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(reply.map_or(Value::Null, Value::Float))
            }
            Command::Del { keys } => {
                let prefixed: Vec<String> = keys.iter().map(|k| self.with_prefix(k)).collect();
                let reply: i64 = redis::cmd("DEL")
                    .arg(prefixed)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::Exists { keys } => {
                let prefixed: Vec<String> = keys.iter().map(|k| self.with_prefix(k)).collect();
                let reply: i64 = redis::cmd("EXISTS")
                    .arg(prefixed)
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::Type { key } => {
                let reply: String = redis::cmd("TYPE")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                if reply == "none" {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Str(reply))
                }
            }
            Command::Keys { pattern } => {
                let pattern = pattern.as_deref().unwrap_or("*");
                let reply: Vec<String> = redis::cmd("KEYS")
                    .arg(self.with_prefix(pattern))
                    .query(conn)
                    .map_err(wire_err)?;
                let mut keys: Vec<String> =
                    reply.into_iter().map(|k| self.strip_prefix(k)).collect();
                keys.sort();
                Ok(Value::from(keys))
            }
            Command::Scan {
                cursor,
                pattern,
                count,
            } => {
                let mut c = redis::cmd("SCAN");
                c.arg(if cursor.is_empty() { "0" } else { cursor.as_str() });
                let pattern = pattern.as_deref().unwrap_or("*");
                c.arg("MATCH").arg(self.with_prefix(pattern));
                if let Some(count) = count {
                    c.arg("COUNT").arg(count);
                }
                let (next, keys): (String, Vec<String>) = c.query(conn).map_err(wire_err)?;
                let keys: Vec<String> = keys.into_iter().map(|k| self.strip_prefix(k)).collect();
                Ok(Value::List(vec![Value::Str(next), Value::from(keys)]))
            }
            Command::Expire { key, seconds } => self.expire_wire(conn, "EXPIRE", key, *seconds),
            Command::PExpire { key, milliseconds } => {
                self.expire_wire(conn, "PEXPIRE", key, *milliseconds)
            }
            Command::ExpireAt { key, at_seconds } => {
                self.expire_wire(conn, "EXPIREAT", key, *at_seconds)
            }
            Command::PExpireAt {
                key,
                at_milliseconds,
            } => self.expire_wire(conn, "PEXPIREAT", key, *at_milliseconds),
            Command::Persist { key } => {
                let reply: bool = redis::cmd("PERSIST")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Bool(reply))
            }
            Command::Ttl { key } => {
                let reply: i64 = redis::cmd("TTL")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::PTtl { key } => {
                let reply: i64 = redis::cmd("PTTL")
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::Int(reply))
            }
            Command::FlushAll => {
                redis::cmd("FLUSHALL")
                    .query::<()>(conn)
                    .map_err(wire_err)?;
                Ok(Value::Null)
            }
        }
    }

    fn pop(
        &self,
        conn: &mut redis::Connection,
        name: &str,
        key: &str,
        count: Option<usize>,
    ) -> Result<Value, RedisError> {
        match count {
            None => {
                let reply: Option<String> = redis::cmd(name)
                    .arg(self.with_prefix(key))
                    .query(conn)
                    .map_err(wire_err)?;
                Ok(Value::from(reply))
            }
            Some(count) => {
                let reply: Option<Vec<String>> = redis::cmd(name)
                    .arg(self.with_prefix(key))
                    .arg(count)
                    .query(conn)
                    .map_err(wire_err)?;
                match reply {
                    Some(items) if !items.is_empty() => Ok(Value::from(items)),
                    _ => Ok(Value::Null),
                }
            }
        }
    }

    fn zpop(
        &self,
        conn: &mut redis::Connection,
        name: &str,
        key: &str,
        count: usize,
    ) -> Result<Value, RedisError> {
        let reply: Vec<(String, f64)> = redis::cmd(name)
            .arg(self.with_prefix(key))
            .arg(count)
            .query(conn)
            .map_err(wire_err)?;
        Ok(crate::command::score_pairs(reply))
    }

    fn expire_wire(
        &self,
        conn: &mut redis::Connection,
        name: &str,
        key: &str,
        when: i64,
    ) -> Result<Value, RedisError> {
        let reply: bool = redis::cmd(name)
            .arg(self.with_prefix(key))
            .arg(when)
            .query(conn)
            .map_err(wire_err)?;
        Ok(Value::Bool(reply))
    }

    /// Runs a compiled script over the wire. Keys are positional and
    /// prefixed; all arguments travel as one JSON array element.
    pub fn run_script(
        &self,
        compiled: &Arc<CompiledScript>,
        invoker: &redis::Script,
        keys: &[String],
        args: &[Value],
    ) -> Result<Value, RedisError> {
        let mut conn = self.conn()?;
        let mut invocation = invoker.prepare_invoke();
        for key in keys {
            invocation.key(self.with_prefix(key));
        }
        invocation.arg(Value::List(args.to_vec()).to_json());
        tracing::debug!(
            target: "redsym",
            digest = %compiled.digest,
            keys = keys.len(),
            "invoking script"
        );
        let reply: Option<String> = invocation.invoke(&mut conn).map_err(script_err)?;
        decode_script_reply(reply)
    }
}

fn set_flags(c: &mut redis::Cmd, opts: &SetOptions) {
    match opts.mode {
        redsym_store::SetMode::Always => {}
        redsym_store::SetMode::IfExists => {
            c.arg("XX");
        }
        redsym_store::SetMode::IfMissing => {
            c.arg("NX");
        }
    }
    if opts.return_previous {
        c.arg("GET");
    }
    if let Some(ms) = opts.expire_in_ms {
        c.arg("PX").arg(ms);
    } else if opts.keep_ttl {
        c.arg("KEEPTTL");
    }
}

/// Decodes the JSON reply of a script. A nil reply and the `{}`/`[]`
/// ambiguity both decode to `Null`; numbers re-tag through the boundary
/// canonicalization.
pub(crate) fn decode_script_reply(reply: Option<String>) -> Result<Value, RedisError> {
    let Some(text) = reply else {
        return Ok(Value::Null);
    };
    if text == "{}" {
        return Ok(Value::Null);
    }
    Ok(boundary(Value::from_json(&text)?))
}

/// Maps transport and server errors of direct commands onto the taxonomy.
fn wire_err(err: redis::RedisError) -> RedisError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
        return RedisError::Connection(err.to_string());
    }
    if err.code() == Some("WRONGTYPE") {
        return RedisError::TypeMismatch;
    }
    let msg = err.to_string();
    if msg.contains("not an integer") {
        return RedisError::NotInteger;
    }
    if msg.contains("not a valid float") {
        return RedisError::NotFloat;
    }
    RedisError::Connection(msg)
}

/// Script failures are normalized to the script kind with the server's
/// message, matching how the interpreter surfaces them.
fn script_err(err: redis::RedisError) -> RedisError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_timeout() {
        return RedisError::Connection(err.to_string());
    }
    RedisError::Script(err.to_string())
}
