//! Redis-call dispatch for scripts. Every `Call(Redis, op, args)` the
//! interpreter executes lands here and routes to the same engine functions
//! the direct command surface uses, so script and direct behavior cannot
//! drift apart. Results follow the host's nil discipline: a miss is `Null`,
//! never `false`.

use std::collections::BTreeMap;

use redsym_core::cmd::SetMode;
use redsym_core::{RedisError, Value};
use redsym_store::{SetOptions, SetOutcome, Store};

/// A number the way it would come back from the Lua boundary: whole values
/// re-tag as integers.
pub(crate) fn num_value(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e17 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

/// Stringifies a value for use as a command argument. Nil and container
/// arguments are rejected, matching what `redis.call` accepts in Lua.
fn arg_str(value: &Value) -> Result<String, RedisError> {
    match value {
        Value::Str(_) | Value::Int(_) | Value::Float(_) => Ok(value.to_display_string()),
        other => Err(RedisError::script(format!(
            "cannot pass a {} argument to a redis command",
            other.type_name()
        ))),
    }
}

fn arg_strs(values: &[Value]) -> Result<Vec<String>, RedisError> {
    values.iter().map(arg_str).collect()
}

/// A strictly integral argument: fractional deltas are rejected the way the
/// server rejects them for INCRBY.
fn int_arg(value: &Value) -> Result<i64, RedisError> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Ok(*f as i64),
        Value::Str(s) => s.trim().parse::<i64>().map_err(|_| RedisError::NotInteger),
        _ => Err(RedisError::NotInteger),
    }
}

fn count_arg(values: &[Value], at: usize) -> Result<Option<usize>, RedisError> {
    match values.get(at) {
        None => Ok(None),
        Some(value) => {
            let n = value.coerce_int()?;
            usize::try_from(n)
                .map(Some)
                .map_err(|_| RedisError::NotInteger)
        }
    }
}

fn popped(items: Vec<String>) -> Value {
    if items.is_empty() {
        Value::Null
    } else {
        Value::from(items)
    }
}

fn score_pairs(entries: Vec<(String, f64)>) -> Value {
    if entries.is_empty() {
        return Value::Null;
    }
    Value::List(
        entries
            .into_iter()
            .map(|(member, score)| Value::List(vec![Value::Str(member), num_value(score)]))
            .collect(),
    )
}

/// Executes one redis operation against the engine. `args[0]` is the key;
/// arity was validated at registration.
pub fn redis_call(
    store: &mut Store,
    now_ms: u64,
    name: &str,
    args: &[Value],
) -> Result<Value, RedisError> {
    let key = arg_str(args.first().ok_or_else(|| RedisError::Arity(name.to_string()))?)?;
    let rest = &args[1..];
    match name {
        "exists" => Ok(Value::from(store.exists(&[key.as_str()], now_ms) as i64)),
        "del" => Ok(Value::from(store.del(&[key.as_str()], now_ms) as i64)),
        "type" => Ok(store
            .key_type(&key, now_ms)
            .map_or(Value::Null, |t| Value::from(t.as_str()))),
        "set" => {
            let value = arg_str(&rest[0])?;
            let mut opts = SetOptions::default();
            let mut pos = 1;
            while pos < rest.len() {
                let flag = arg_str(&rest[pos])?.to_ascii_uppercase();
                match flag.as_str() {
                    "XX" => opts.mode = SetMode::IfExists,
                    "NX" => opts.mode = SetMode::IfMissing,
                    "GET" => opts.return_previous = true,
                    "KEEPTTL" => opts.keep_ttl = true,
                    "PX" => {
                        pos += 1;
                        let ms = rest
                            .get(pos)
                            .ok_or_else(|| RedisError::Arity(name.to_string()))?
                            .coerce_int()?;
                        opts.expire_in_ms = Some(u64::try_from(ms).unwrap_or(0));
                    }
                    other => {
                        return Err(RedisError::script(format!("unknown SET flag: {other}")));
                    }
                }
                pos += 1;
            }
            match store.set(&key, value, &opts, now_ms)? {
                SetOutcome::Stored(stored) => Ok(Value::Bool(stored)),
                SetOutcome::Previous(prev) => Ok(Value::from(prev)),
            }
        }
        "get" => Ok(Value::from(store.get(&key, now_ms)?)),
        "incrby" => {
            let delta = int_arg(&rest[0])?;
            Ok(Value::Int(store.incrby(&key, delta, now_ms)?))
        }
        "incrbyfloat" => {
            let delta = rest[0].coerce_float()?;
            Ok(num_value(store.incrbyfloat(&key, delta, now_ms)?))
        }
        "lpush" => Ok(Value::from(
            store.lpush(&key, &arg_strs(rest)?, now_ms)? as i64
        )),
        "rpush" => Ok(Value::from(
            store.rpush(&key, &arg_strs(rest)?, now_ms)? as i64
        )),
        "lpop" => match count_arg(rest, 0)? {
            None => Ok(Value::from(store.lpop(&key, now_ms)?)),
            Some(count) => Ok(popped(store.lpop_count(&key, count, now_ms)?)),
        },
        "rpop" => match count_arg(rest, 0)? {
            None => Ok(Value::from(store.rpop(&key, now_ms)?)),
            Some(count) => Ok(popped(store.rpop_count(&key, count, now_ms)?)),
        },
        "lrange" => {
            let start = rest[0].coerce_int()?;
            let stop = rest[1].coerce_int()?;
            Ok(Value::from(store.lrange(&key, start, stop, now_ms)?))
        }
        "llen" => Ok(Value::from(store.llen(&key, now_ms)? as i64)),
        "lindex" => {
            let index = rest[0].coerce_int()?;
            Ok(Value::from(store.lindex(&key, index, now_ms)?))
        }
        "hset" => {
            if rest.len() % 2 != 0 {
                return Err(RedisError::Arity(name.to_string()));
            }
            let mut pairs = Vec::with_capacity(rest.len() / 2);
            for chunk in rest.chunks(2) {
                pairs.push((arg_str(&chunk[0])?, arg_str(&chunk[1])?));
            }
            Ok(Value::from(store.hset(&key, &pairs, now_ms)? as i64))
        }
        "hdel" => {
            let fields = arg_strs(rest)?;
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            Ok(Value::from(store.hdel(&key, &refs, now_ms)? as i64))
        }
        "hget" => Ok(Value::from(store.hget(&key, &arg_str(&rest[0])?, now_ms)?)),
        "hmget" => {
            let fields = arg_strs(rest)?;
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            let values = store.hmget(&key, &refs, now_ms)?;
            let map: BTreeMap<String, Value> = fields
                .into_iter()
                .zip(values)
                .map(|(field, value)| (field, Value::from(value)))
                .collect();
            Ok(Value::Map(map))
        }
        "hincrby" | "hincrbyfloat" => {
            let field = arg_str(&rest[0])?;
            let delta = rest[1].coerce_float()?;
            Ok(num_value(store.hincrby(&key, &field, delta, now_ms)?))
        }
        "hkeys" => Ok(Value::from(store.hkeys(&key, now_ms)?)),
        "hvals" => Ok(Value::from(store.hvals(&key, now_ms)?)),
        "hgetall" => {
            let map: BTreeMap<String, Value> = store
                .hgetall(&key, now_ms)?
                .into_iter()
                .map(|(field, value)| (field, Value::Str(value)))
                .collect();
            Ok(Value::Map(map))
        }
        "sadd" => Ok(Value::from(
            store.sadd(&key, &arg_strs(rest)?, now_ms)? as i64
        )),
        "srem" => {
            let members = arg_strs(rest)?;
            let refs: Vec<&str> = members.iter().map(String::as_str).collect();
            Ok(Value::from(store.srem(&key, &refs, now_ms)? as i64))
        }
        "sismember" => Ok(Value::Bool(
            store.sismember(&key, &arg_str(&rest[0])?, now_ms)?,
        )),
        "scard" => Ok(Value::from(store.scard(&key, now_ms)? as i64)),
        "smembers" => Ok(Value::from(store.smembers(&key, now_ms)?)),
        "zadd" => {
            let score = rest[0].coerce_float()?;
            let member = arg_str(&rest[1])?;
            Ok(Value::from(
                store.zadd(&key, &[(member, score)], now_ms)? as i64
            ))
        }
        "zrem" => {
            let members = arg_strs(rest)?;
            let refs: Vec<&str> = members.iter().map(String::as_str).collect();
            Ok(Value::from(store.zrem(&key, &refs, now_ms)? as i64))
        }
        "zscore" => Ok(store
            .zscore(&key, &arg_str(&rest[0])?, now_ms)?
            .map_or(Value::Null, num_value)),
        "zrange" => {
            let start = rest[0].coerce_int()?;
            let stop = rest[1].coerce_int()?;
            Ok(Value::from(store.zrange(&key, start, stop, now_ms)?))
        }
        "zpopmin" => {
            let count = count_arg(rest, 0)?.unwrap_or(1);
            Ok(score_pairs(store.zpop_min(&key, count, now_ms)?))
        }
        "zpopmax" => {
            let count = count_arg(rest, 0)?.unwrap_or(1);
            Ok(score_pairs(store.zpop_max(&key, count, now_ms)?))
        }
        "zcard" => Ok(Value::from(store.zcard(&key, now_ms)? as i64)),
        "expire" => {
            let seconds = rest[0].coerce_int()?;
            Ok(Value::Bool(store.expire(&key, seconds, now_ms)))
        }
        "ttl" => Ok(Value::Int(store.pttl(&key, now_ms).as_seconds())),
        "persist" => Ok(Value::Bool(store.persist(&key, now_ms))),
        _ => Err(RedisError::NotImplemented(name.to_string())),
    }
}
