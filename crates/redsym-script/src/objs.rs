//! Typed wrappers over redis keys. Each method desugars to a `Call` node in
//! the execution graph; nothing here touches an engine.

use redsym_core::Value;
use redsym_core::cmd::SetMode;
use redsym_core::ir::{CallKind, Conv, Expr};

use crate::sym::Sym;

fn call(kind: CallKind, name: &str, args: Vec<Sym>) -> Sym {
    Sym(Expr::Call {
        kind,
        name: name.to_string(),
        args: args.into_iter().map(Sym::expr).collect(),
        raw: false,
    })
}

/// Calls a redis command on a key. The escape hatch behind all wrappers.
#[must_use]
pub fn redis_fn(name: &str, key: impl Into<Sym>, args: Vec<Sym>) -> Sym {
    let mut full = vec![key.into()];
    full.extend(args);
    call(CallKind::Redis, name, full)
}

/// Calls an operation registered as a plugin.
#[must_use]
pub fn call_plugin(name: &str, args: Vec<Sym>) -> Sym {
    call(CallKind::Plugin, name, args)
}

/// String concatenation of a sequence of expressions.
#[must_use]
pub fn concat(items: impl IntoIterator<Item = Sym>) -> Sym {
    Sym(Expr::Concat(items.into_iter().map(Sym::expr).collect()))
}

#[must_use]
pub fn to_num(value: impl Into<Sym>) -> Sym {
    Sym(Expr::Convert {
        conv: Conv::ToNum,
        expr: Box::new(value.into().expr()),
    })
}

#[must_use]
pub fn to_int_str(value: impl Into<Sym>) -> Sym {
    Sym(Expr::Convert {
        conv: Conv::ToIntStr,
        expr: Box::new(value.into().expr()),
    })
}

#[must_use]
pub fn to_str(value: impl Into<Sym>) -> Sym {
    Sym(Expr::Convert {
        conv: Conv::ToStr,
        expr: Box::new(value.into().expr()),
    })
}

/// Finds a substring; yields the 0-based index or `Null`.
#[must_use]
pub fn string_find(haystack: impl Into<Sym>, needle: impl Into<Sym>, start: Option<Sym>) -> Sym {
    let mut args = vec![haystack.into(), needle.into()];
    if let Some(start) = start {
        args.push(start);
    }
    call(CallKind::General, "string.find", args)
}

#[must_use]
pub fn cjson_decode(value: impl Into<Sym>) -> Sym {
    call(CallKind::General, "cjson.decode", vec![value.into()])
}

#[must_use]
pub fn cjson_encode(value: impl Into<Sym>) -> Sym {
    call(CallKind::General, "cjson.encode", vec![value.into()])
}

/// The Lua-style type name of a value.
#[must_use]
pub fn type_of(value: impl Into<Sym>) -> Sym {
    call(CallKind::General, "type", vec![value.into()])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Verbose => "VERBOSE",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
        }
    }
}

/// Logs a message from inside the script.
#[must_use]
pub fn log(level: LogLevel, message: impl Into<Sym>) -> Sym {
    call(
        CallKind::General,
        "redis.log",
        vec![Sym::lit(level.as_str()), message.into()],
    )
}

/// Options of the `SET` script operation.
#[derive(Debug, Clone, Default)]
pub struct SetScriptOptions {
    pub mode: SetMode,
    pub return_previous: bool,
    /// Relative expiry in seconds, sent as `PX` milliseconds.
    pub expire_in: Option<f64>,
    pub keep_ttl: bool,
}

/// A plain redis string value.
pub struct RedisVar {
    key: Sym,
}

impl RedisVar {
    #[must_use]
    pub fn new(key: impl Into<Sym>) -> Self {
        Self { key: key.into() }
    }

    fn fn_(&self, name: &str, args: Vec<Sym>) -> Sym {
        redis_fn(name, self.key.clone(), args)
    }

    #[must_use]
    pub fn set(&self, value: impl Into<Sym>) -> Sym {
        self.set_opts(value, &SetScriptOptions::default())
    }

    #[must_use]
    pub fn set_opts(&self, value: impl Into<Sym>, opts: &SetScriptOptions) -> Sym {
        let mut args = vec![value.into()];
        match opts.mode {
            SetMode::Always => {}
            SetMode::IfExists => args.push(Sym::lit("XX")),
            SetMode::IfMissing => args.push(Sym::lit("NX")),
        }
        if opts.return_previous {
            args.push(Sym::lit("GET"));
        }
        if let Some(expire_in) = opts.expire_in {
            args.push(Sym::lit("PX"));
            args.push(Sym::lit((expire_in * 1000.0) as i64));
        } else if opts.keep_ttl {
            args.push(Sym::lit("KEEPTTL"));
        }
        self.fn_("set", args)
    }

    #[must_use]
    pub fn get(&self) -> Sym {
        self.fn_("get", Vec::new())
    }

    /// The value, or a default when the key is missing.
    #[must_use]
    pub fn get_default(&self, default: impl Into<Value>) -> Sym {
        self.get().or_(Sym::lit(default.into()))
    }

    #[must_use]
    pub fn incrby(&self, inc: impl Into<Sym>) -> Sym {
        self.fn_("incrby", vec![inc.into()])
    }

    #[must_use]
    pub fn exists(&self) -> Sym {
        self.fn_("exists", Vec::new())
    }

    #[must_use]
    pub fn delete(&self) -> Sym {
        self.fn_("del", Vec::new())
    }
}

/// A redis list.
pub struct RedisList {
    key: Sym,
}

impl RedisList {
    #[must_use]
    pub fn new(key: impl Into<Sym>) -> Self {
        Self { key: key.into() }
    }

    fn fn_(&self, name: &str, args: Vec<Sym>) -> Sym {
        redis_fn(name, self.key.clone(), args)
    }

    #[must_use]
    pub fn lpush(&self, values: Vec<Sym>) -> Sym {
        self.fn_("lpush", values)
    }

    #[must_use]
    pub fn rpush(&self, values: Vec<Sym>) -> Sym {
        self.fn_("rpush", values)
    }

    /// Pops one value; `Null` when the list is empty.
    #[must_use]
    pub fn lpop(&self) -> Sym {
        self.fn_("lpop", Vec::new())
    }

    /// Pops up to `count` values as a list.
    #[must_use]
    pub fn lpop_count(&self, count: impl Into<Sym>) -> Sym {
        self.fn_("lpop", vec![count.into()])
    }

    #[must_use]
    pub fn rpop(&self) -> Sym {
        self.fn_("rpop", Vec::new())
    }

    #[must_use]
    pub fn rpop_count(&self, count: impl Into<Sym>) -> Sym {
        self.fn_("rpop", vec![count.into()])
    }

    #[must_use]
    pub fn llen(&self) -> Sym {
        self.fn_("llen", Vec::new())
    }

    #[must_use]
    pub fn lrange(&self, start: impl Into<Sym>, stop: impl Into<Sym>) -> Sym {
        self.fn_("lrange", vec![start.into(), stop.into()])
    }

    #[must_use]
    pub fn lindex(&self, index: impl Into<Sym>) -> Sym {
        self.fn_("lindex", vec![index.into()])
    }

    #[must_use]
    pub fn exists(&self) -> Sym {
        self.fn_("exists", Vec::new())
    }

    #[must_use]
    pub fn delete(&self) -> Sym {
        self.fn_("del", Vec::new())
    }
}

/// A redis hash.
pub struct RedisHash {
    key: Sym,
}

impl RedisHash {
    #[must_use]
    pub fn new(key: impl Into<Sym>) -> Self {
        Self { key: key.into() }
    }

    fn fn_(&self, name: &str, args: Vec<Sym>) -> Sym {
        redis_fn(name, self.key.clone(), args)
    }

    /// Sets fields from a mapping, flattened into field/value pairs.
    #[must_use]
    pub fn hset(&self, mapping: Vec<(Sym, Sym)>) -> Sym {
        let mut args = Vec::with_capacity(mapping.len() * 2);
        for (field, value) in mapping {
            args.push(field);
            args.push(value);
        }
        self.fn_("hset", args)
    }

    #[must_use]
    pub fn hget(&self, field: impl Into<Sym>) -> Sym {
        self.fn_("hget", vec![field.into()])
    }

    #[must_use]
    pub fn hdel(&self, fields: Vec<Sym>) -> Sym {
        self.fn_("hdel", fields)
    }

    /// Gets multiple fields as a map of field to value-or-`Null`.
    #[must_use]
    pub fn hmget(&self, fields: Vec<Sym>) -> Sym {
        self.fn_("hmget", fields)
    }

    #[must_use]
    pub fn hincrby(&self, field: impl Into<Sym>, inc: impl Into<Sym>) -> Sym {
        self.fn_("hincrby", vec![field.into(), inc.into()])
    }

    #[must_use]
    pub fn hkeys(&self) -> Sym {
        self.fn_("hkeys", Vec::new())
    }

    #[must_use]
    pub fn hvals(&self) -> Sym {
        self.fn_("hvals", Vec::new())
    }

    #[must_use]
    pub fn hgetall(&self) -> Sym {
        self.fn_("hgetall", Vec::new())
    }

    #[must_use]
    pub fn exists(&self) -> Sym {
        self.fn_("exists", Vec::new())
    }

    #[must_use]
    pub fn delete(&self) -> Sym {
        self.fn_("del", Vec::new())
    }
}

/// A redis set.
pub struct RedisSet {
    key: Sym,
}

impl RedisSet {
    #[must_use]
    pub fn new(key: impl Into<Sym>) -> Self {
        Self { key: key.into() }
    }

    fn fn_(&self, name: &str, args: Vec<Sym>) -> Sym {
        redis_fn(name, self.key.clone(), args)
    }

    #[must_use]
    pub fn sadd(&self, values: Vec<Sym>) -> Sym {
        self.fn_("sadd", values)
    }

    #[must_use]
    pub fn srem(&self, values: Vec<Sym>) -> Sym {
        self.fn_("srem", values)
    }

    #[must_use]
    pub fn sismember(&self, value: impl Into<Sym>) -> Sym {
        self.fn_("sismember", vec![value.into()])
    }

    #[must_use]
    pub fn scard(&self) -> Sym {
        self.fn_("scard", Vec::new())
    }

    #[must_use]
    pub fn smembers(&self) -> Sym {
        self.fn_("smembers", Vec::new())
    }

    #[must_use]
    pub fn exists(&self) -> Sym {
        self.fn_("exists", Vec::new())
    }

    #[must_use]
    pub fn delete(&self) -> Sym {
        self.fn_("del", Vec::new())
    }
}

/// A redis sorted set.
pub struct RedisSortedSet {
    key: Sym,
}

impl RedisSortedSet {
    #[must_use]
    pub fn new(key: impl Into<Sym>) -> Self {
        Self { key: key.into() }
    }

    fn fn_(&self, name: &str, args: Vec<Sym>) -> Sym {
        redis_fn(name, self.key.clone(), args)
    }

    #[must_use]
    pub fn add(&self, score: impl Into<Sym>, value: impl Into<Sym>) -> Sym {
        self.fn_("zadd", vec![score.into(), value.into()])
    }

    /// Pops the highest-scored members as `(member, score)` pairs.
    #[must_use]
    pub fn pop_max(&self, count: Option<Sym>) -> Sym {
        self.fn_("zpopmax", count.into_iter().collect())
    }

    #[must_use]
    pub fn pop_min(&self, count: Option<Sym>) -> Sym {
        self.fn_("zpopmin", count.into_iter().collect())
    }

    #[must_use]
    pub fn card(&self) -> Sym {
        self.fn_("zcard", Vec::new())
    }

    #[must_use]
    pub fn remove(&self, members: Vec<Sym>) -> Sym {
        self.fn_("zrem", members)
    }

    #[must_use]
    pub fn range(&self, start: impl Into<Sym>, stop: impl Into<Sym>) -> Sym {
        self.fn_("zrange", vec![start.into(), stop.into()])
    }

    #[must_use]
    pub fn exists(&self) -> Sym {
        self.fn_("exists", Vec::new())
    }

    #[must_use]
    pub fn delete(&self) -> Sym {
        self.fn_("del", Vec::new())
    }
}
