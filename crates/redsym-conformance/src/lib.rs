#![forbid(unsafe_code)]

//! Script-level helpers exercised by the conformance suites. Both are built
//! entirely through the public symbolic API, so they run unchanged on the
//! memory backend and on a real server.

use std::collections::HashMap;

use redsym_client::{Client, ScriptHandle, args_of, keys_of};
use redsym_core::{RedisError, Value};
use redsym_script::{FnContext, RedisHash, RedisList, RedisVar, Sym, concat, to_int_str, to_num};

/// Registers a script that drains a list into two target lists, splitting on
/// a numeric pivot. Values below the pivot go left, the rest go right,
/// keeping their relative order.
pub fn filter_list(client: &Client) -> Result<ScriptHandle, RedisError> {
    let ctx = FnContext::new();
    let inp = RedisList::new(ctx.add_key("inp"));
    let left = RedisList::new(ctx.add_key("left"));
    let right = RedisList::new(ctx.add_key("right"));
    let pivot = ctx.add_arg("cmp");
    let cur = ctx.add_local(inp.lpop());
    let body = ctx.while_(cur.sym().ne_(Sym::null()));
    let (below, above) = body.if_(to_num(cur.sym()).lt_(pivot));
    below.add(left.rpush(vec![cur.sym()]));
    above.add(right.rpush(vec![cur.sym()]));
    body.add(cur.assign(inp.lpop()));
    ctx.set_return_value(Sym::null());
    client.register_script(&ctx)
}

/// A dictionary stack in redis. Frames shadow fields; values can be read
/// from the top frame alone or cascading down the stack.
pub struct RStack {
    client: Client,
    set_value: ScriptHandle,
    get_value: ScriptHandle,
    pop_frame: ScriptHandle,
    get_cascading: ScriptHandle,
}

impl RStack {
    pub fn new(client: &Client) -> Result<Self, RedisError> {
        Ok(Self {
            client: client.clone(),
            set_value: Self::set_value_script(client)?,
            get_value: Self::get_value_script(client)?,
            pop_frame: Self::pop_frame_script(client)?,
            get_cascading: Self::get_cascading_script(client)?,
        })
    }

    /// The storage key of a stack component.
    #[must_use]
    pub fn key(base: &str, name: &str) -> String {
        format!("{base}:{name}")
    }

    fn call_keys(base: &str) -> HashMap<String, String> {
        keys_of(&[
            ("size", &Self::key(base, "size")),
            ("frame", &Self::key(base, "frame")),
        ])
    }

    pub fn push_frame(&self, base: &str) -> Result<(), RedisError> {
        self.client.incrby(&Self::key(base, "size"), 1)?;
        Ok(())
    }

    /// Pops the current frame and returns its contents.
    pub fn pop_frame(&self, base: &str) -> Result<HashMap<String, String>, RedisError> {
        let res = self
            .pop_frame
            .run(&Self::call_keys(base), &HashMap::new())?;
        match res {
            Value::Null => Ok(HashMap::new()),
            Value::Map(map) => Ok(map
                .into_iter()
                .map(|(field, value)| (field, value.to_display_string()))
                .collect()),
            other => Err(RedisError::script(format!(
                "unexpected pop result: {other:?}"
            ))),
        }
    }

    pub fn set_value(&self, base: &str, field: &str, value: &str) -> Result<(), RedisError> {
        self.set_value.run(
            &Self::call_keys(base),
            &args_of(&[("field", Value::from(field)), ("value", Value::from(value))]),
        )?;
        Ok(())
    }

    /// Reads a field from the top frame only.
    pub fn get_value(&self, base: &str, field: &str) -> Result<Value, RedisError> {
        self.get_value.run(
            &Self::call_keys(base),
            &args_of(&[("field", Value::from(field))]),
        )
    }

    /// Reads a field, falling back through lower frames until a value is
    /// found.
    pub fn get_cascading(&self, base: &str, field: &str) -> Result<Value, RedisError> {
        self.get_cascading.run(
            &Self::call_keys(base),
            &args_of(&[("field", Value::from(field))]),
        )
    }

    fn set_value_script(client: &Client) -> Result<ScriptHandle, RedisError> {
        let ctx = FnContext::new();
        let size = RedisVar::new(ctx.add_key("size"));
        let frame = RedisHash::new(concat([
            ctx.add_key("frame"),
            Sym::lit(":"),
            to_int_str(size.get_default(0)),
        ]));
        let field = ctx.add_arg("field");
        let value = ctx.add_arg("value");
        ctx.add(frame.hset(vec![(field, value)]));
        ctx.set_return_value(Sym::null());
        client.register_script(&ctx)
    }

    fn get_value_script(client: &Client) -> Result<ScriptHandle, RedisError> {
        let ctx = FnContext::new();
        let size = RedisVar::new(ctx.add_key("size"));
        let frame = RedisHash::new(concat([
            ctx.add_key("frame"),
            Sym::lit(":"),
            to_int_str(size.get_default(0)),
        ]));
        let field = ctx.add_arg("field");
        ctx.set_return_value(frame.hget(field));
        client.register_script(&ctx)
    }

    fn pop_frame_script(client: &Client) -> Result<ScriptHandle, RedisError> {
        let ctx = FnContext::new();
        let size = RedisVar::new(ctx.add_key("size"));
        let frame = RedisHash::new(concat([
            ctx.add_key("frame"),
            Sym::lit(":"),
            to_int_str(size.get_default(0)),
        ]));
        let contents = ctx.add_local(frame.hgetall());
        ctx.add(frame.delete());
        let (deeper, bottom) = ctx.if_(to_num(size.get_default(0)).gt_(0));
        deeper.add(size.incrby(-1));
        bottom.add(size.delete());
        ctx.set_return_value(contents.sym());
        client.register_script(&ctx)
    }

    fn get_cascading_script(client: &Client) -> Result<ScriptHandle, RedisError> {
        let ctx = FnContext::new();
        let size = RedisVar::new(ctx.add_key("size"));
        let base = ctx.add_local(ctx.add_key("frame"));
        let field = ctx.add_arg("field");
        let pos = ctx.add_local(to_num(size.get_default(0)));
        let res = ctx.add_local(Sym::null());
        let cur = ctx.add_local(Sym::null());
        let frame = RedisHash::new(cur.sym());
        let body = ctx.while_(res.sym().eq_(Sym::null()).and_(pos.sym().ge_(0)));
        body.add(cur.assign(concat([base.sym(), Sym::lit(":"), to_int_str(pos.sym())])));
        body.add(res.assign(frame.hget(field.clone())));
        body.add(pos.assign(pos.sym() - 1));
        ctx.set_return_value(res.sym());
        client.register_script(&ctx)
    }
}
