//! The unified command set. Every direct operation, whether from the client
//! surface or a pipeline slot, is a `Command` value routed through one
//! `apply` function on the memory backend or one wire translation on the
//! external backend, so the two paths cannot diverge on argument handling.

use std::collections::BTreeMap;

use redsym_core::{RedisError, Value};
use redsym_store::{SetOptions, SetOutcome, Store};

#[derive(Debug, Clone)]
pub enum Command {
    Set {
        key: String,
        value: String,
        opts: SetOptions,
    },
    Get {
        key: String,
    },
    IncrBy {
        key: String,
        delta: i64,
    },
    IncrByFloat {
        key: String,
        delta: f64,
    },
    LPush {
        key: String,
        values: Vec<String>,
    },
    RPush {
        key: String,
        values: Vec<String>,
    },
    LPop {
        key: String,
        count: Option<usize>,
    },
    RPop {
        key: String,
        count: Option<usize>,
    },
    LRange {
        key: String,
        start: i64,
        stop: i64,
    },
    LLen {
        key: String,
    },
    LIndex {
        key: String,
        index: i64,
    },
    HSet {
        key: String,
        pairs: Vec<(String, String)>,
    },
    HGet {
        key: String,
        field: String,
    },
    HDel {
        key: String,
        fields: Vec<String>,
    },
    HGetAll {
        key: String,
    },
    HKeys {
        key: String,
    },
    HVals {
        key: String,
    },
    HMGet {
        key: String,
        fields: Vec<String>,
    },
    HIncrBy {
        key: String,
        field: String,
        delta: f64,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    SRem {
        key: String,
        members: Vec<String>,
    },
    SIsMember {
        key: String,
        member: String,
    },
    SCard {
        key: String,
    },
    SMembers {
        key: String,
    },
    ZAdd {
        key: String,
        entries: Vec<(String, f64)>,
    },
    ZRange {
        key: String,
        start: i64,
        stop: i64,
    },
    ZPopMin {
        key: String,
        count: usize,
    },
    ZPopMax {
        key: String,
        count: usize,
    },
    ZCard {
        key: String,
    },
    ZRem {
        key: String,
        members: Vec<String>,
    },
    ZScore {
        key: String,
        member: String,
    },
    Del {
        keys: Vec<String>,
    },
    Exists {
        keys: Vec<String>,
    },
    Type {
        key: String,
    },
    Keys {
        pattern: Option<String>,
    },
    Scan {
        cursor: String,
        pattern: Option<String>,
        count: Option<usize>,
    },
    Expire {
        key: String,
        seconds: i64,
    },
    PExpire {
        key: String,
        milliseconds: i64,
    },
    ExpireAt {
        key: String,
        at_seconds: i64,
    },
    PExpireAt {
        key: String,
        at_milliseconds: i64,
    },
    Persist {
        key: String,
    },
    Ttl {
        key: String,
    },
    PTtl {
        key: String,
    },
    FlushAll,
}

fn str_refs(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}

fn popped(items: Vec<String>) -> Value {
    if items.is_empty() {
        Value::Null
    } else {
        Value::from(items)
    }
}

pub(crate) fn score_pairs(entries: Vec<(String, f64)>) -> Value {
    Value::List(
        entries
            .into_iter()
            .map(|(member, score)| Value::List(vec![Value::Str(member), Value::Float(score)]))
            .collect(),
    )
}

/// Executes one command against the engine. The returned `Value` shape is
/// the cross-backend contract; the wire decoder produces identical shapes.
pub fn apply(store: &mut Store, now_ms: u64, cmd: &Command) -> Result<Value, RedisError> {
    match cmd {
        Command::Set { key, value, opts } => match store.set(key, value.clone(), opts, now_ms)? {
            SetOutcome::Stored(stored) => Ok(Value::Bool(stored)),
            SetOutcome::Previous(prev) => Ok(Value::from(prev)),
        },
        Command::Get { key } => Ok(Value::from(store.get(key, now_ms)?)),
        Command::IncrBy { key, delta } => Ok(Value::Int(store.incrby(key, *delta, now_ms)?)),
        Command::IncrByFloat { key, delta } => {
            Ok(Value::Float(store.incrbyfloat(key, *delta, now_ms)?))
        }
        Command::LPush { key, values } => {
            Ok(Value::from(store.lpush(key, values, now_ms)? as i64))
        }
        Command::RPush { key, values } => {
            Ok(Value::from(store.rpush(key, values, now_ms)? as i64))
        }
        Command::LPop { key, count } => match count {
            None => Ok(Value::from(store.lpop(key, now_ms)?)),
            Some(count) => Ok(popped(store.lpop_count(key, *count, now_ms)?)),
        },
        Command::RPop { key, count } => match count {
            None => Ok(Value::from(store.rpop(key, now_ms)?)),
            Some(count) => Ok(popped(store.rpop_count(key, *count, now_ms)?)),
        },
        Command::LRange { key, start, stop } => {
            Ok(Value::from(store.lrange(key, *start, *stop, now_ms)?))
        }
        Command::LLen { key } => Ok(Value::from(store.llen(key, now_ms)? as i64)),
        Command::LIndex { key, index } => Ok(Value::from(store.lindex(key, *index, now_ms)?)),
        Command::HSet { key, pairs } => Ok(Value::from(store.hset(key, pairs, now_ms)? as i64)),
        Command::HGet { key, field } => Ok(Value::from(store.hget(key, field, now_ms)?)),
        Command::HDel { key, fields } => {
            Ok(Value::from(store.hdel(key, &str_refs(fields), now_ms)? as i64))
        }
        Command::HGetAll { key } => {
            let map: BTreeMap<String, Value> = store
                .hgetall(key, now_ms)?
                .into_iter()
                .map(|(field, value)| (field, Value::Str(value)))
                .collect();
            Ok(Value::Map(map))
        }
        Command::HKeys { key } => Ok(Value::from(store.hkeys(key, now_ms)?)),
        Command::HVals { key } => Ok(Value::from(store.hvals(key, now_ms)?)),
        Command::HMGet { key, fields } => {
            let values = store.hmget(key, &str_refs(fields), now_ms)?;
            Ok(Value::List(values.into_iter().map(Value::from).collect()))
        }
        Command::HIncrBy { key, field, delta } => {
            Ok(Value::Float(store.hincrby(key, field, *delta, now_ms)?))
        }
        Command::SAdd { key, members } => {
            Ok(Value::from(store.sadd(key, members, now_ms)? as i64))
        }
        Command::SRem { key, members } => {
            Ok(Value::from(store.srem(key, &str_refs(members), now_ms)? as i64))
        }
        Command::SIsMember { key, member } => {
            Ok(Value::Bool(store.sismember(key, member, now_ms)?))
        }
        Command::SCard { key } => Ok(Value::from(store.scard(key, now_ms)? as i64)),
        Command::SMembers { key } => Ok(Value::from(store.smembers(key, now_ms)?)),
        Command::ZAdd { key, entries } => {
            Ok(Value::from(store.zadd(key, entries, now_ms)? as i64))
        }
        Command::ZRange { key, start, stop } => {
            Ok(Value::from(store.zrange(key, *start, *stop, now_ms)?))
        }
        Command::ZPopMin { key, count } => {
            Ok(score_pairs(store.zpop_min(key, *count, now_ms)?))
        }
        Command::ZPopMax { key, count } => {
            Ok(score_pairs(store.zpop_max(key, *count, now_ms)?))
        }
        Command::ZCard { key } => Ok(Value::from(store.zcard(key, now_ms)? as i64)),
        Command::ZRem { key, members } => {
            Ok(Value::from(store.zrem(key, &str_refs(members), now_ms)? as i64))
        }
        Command::ZScore { key, member } => Ok(store
            .zscore(key, member, now_ms)?
            .map_or(Value::Null, Value::Float)),
        Command::Del { keys } => Ok(Value::from(store.del(&str_refs(keys), now_ms) as i64)),
        Command::Exists { keys } => Ok(Value::from(store.exists(&str_refs(keys), now_ms) as i64)),
        Command::Type { key } => Ok(store
            .key_type(key, now_ms)
            .map_or(Value::Null, |t| Value::from(t.as_str()))),
        Command::Keys { pattern } => {
            Ok(Value::from(store.keys_matching(pattern.as_deref(), now_ms)))
        }
        Command::Scan {
            cursor,
            pattern,
            count,
        } => {
            let (next, keys) = store.scan(cursor, pattern.as_deref(), *count, now_ms);
            Ok(Value::List(vec![Value::Str(next), Value::from(keys)]))
        }
        Command::Expire { key, seconds } => Ok(Value::Bool(store.expire(key, *seconds, now_ms))),
        Command::PExpire { key, milliseconds } => {
            Ok(Value::Bool(store.pexpire(key, *milliseconds, now_ms)))
        }
        Command::ExpireAt { key, at_seconds } => {
            Ok(Value::Bool(store.expire_at(key, *at_seconds, now_ms)))
        }
        Command::PExpireAt {
            key,
            at_milliseconds,
        } => Ok(Value::Bool(store.pexpire_at(key, *at_milliseconds, now_ms))),
        Command::Persist { key } => Ok(Value::Bool(store.persist(key, now_ms))),
        Command::Ttl { key } => Ok(Value::Int(store.pttl(key, now_ms).as_seconds())),
        Command::PTtl { key } => Ok(Value::Int(store.pttl(key, now_ms).as_millis())),
        Command::FlushAll => {
            store.flushall();
            Ok(Value::Null)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, apply};
    use redsym_core::{RedisError, Value};
    use redsym_store::{SetOptions, Store};

    #[test]
    fn dispatch_shapes_are_stable() {
        let mut store = Store::new();
        let set = apply(
            &mut store,
            0,
            &Command::Set {
                key: "k".to_string(),
                value: "v".to_string(),
                opts: SetOptions::default(),
            },
        )
        .unwrap();
        assert_eq!(set, Value::Bool(true));
        let get = apply(
            &mut store,
            0,
            &Command::Get {
                key: "k".to_string(),
            },
        )
        .unwrap();
        assert_eq!(get, Value::from("v"));
    }

    #[test]
    fn wrong_type_surfaces_per_command() {
        let mut store = Store::new();
        apply(
            &mut store,
            0,
            &Command::Set {
                key: "k".to_string(),
                value: "v".to_string(),
                opts: SetOptions::default(),
            },
        )
        .unwrap();
        let res = apply(
            &mut store,
            0,
            &Command::LPush {
                key: "k".to_string(),
                values: vec!["x".to_string()],
            },
        );
        assert_eq!(res, Err(RedisError::TypeMismatch));
    }

    #[test]
    fn counted_pop_of_nothing_is_null() {
        let mut store = Store::new();
        let res = apply(
            &mut store,
            0,
            &Command::LPop {
                key: "gone".to_string(),
                count: Some(3),
            },
        )
        .unwrap();
        assert_eq!(res, Value::Null);
    }
}
