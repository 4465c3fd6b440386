use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use redsym_core::Value;
use redsym_core::cmd::Arity;
use redsym_core::ir::{CallKind, Expr};
use redsym_exec::{PluginFunction, ScriptRegistry, bind_call};
use redsym_script::{
    FnContext, RedisHash, RedisList, Sym, break_loop, call_plugin, continue_loop, redis_fn,
};
use redsym_store::Store;

fn run(
    registry: &mut ScriptRegistry,
    ctx: &FnContext,
    store: &mut Store,
    keys: &[(&str, &str)],
    args: &[(&str, Value)],
) -> Value {
    let compiled = registry.compile(ctx.compile().unwrap()).unwrap();
    let keys: HashMap<String, String> = keys
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let args: HashMap<String, Value> = args
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    let (key_values, arg_values) = bind_call(&compiled.script, &keys, &args).unwrap();
    registry
        .run_local(&compiled, store, 0, &key_values, &arg_values)
        .unwrap()
}

fn arithmetic_ctx() -> FnContext {
    let ctx = FnContext::new();
    let a = ctx.add_arg("a");
    let b = ctx.add_arg("b");
    let c = ctx.add_local(5);
    let d = ctx.add_local(0.0);
    let (then_block, else_block) = ctx.if_((a.clone() + b.clone()).ge_(10));
    then_block.add(c.assign(a - b));
    then_block.add(d.assign(2.5));
    else_block.add(d.assign(7.5));
    ctx.set_return_value(c.sym() + d.sym());
    ctx
}

#[test]
fn arithmetic_script_on_the_interpreter() {
    let cases = [
        (2, 4, Value::Float(12.5)),
        (3, 7, Value::Float(-1.5)),
        (13, 2, Value::Float(13.5)),
    ];
    for (a, b, expected) in cases {
        let ctx = arithmetic_ctx();
        let mut registry = ScriptRegistry::new();
        let mut store = Store::new();
        let res = run(
            &mut registry,
            &ctx,
            &mut store,
            &[],
            &[("a", Value::Int(a)), ("b", Value::Int(b))],
        );
        assert_eq!(res, expected);
    }
}

#[test]
fn arithmetic_script_lua_text() {
    let ctx = arithmetic_ctx();
    let mut registry = ScriptRegistry::new();
    let compiled = registry.compile(ctx.compile().unwrap()).unwrap();
    let expected = r#"-- HELPERS START --
local redsym = {}
function redsym.cmp (op, a, b)
  if type(a) == "number" and type(b) == "string" then
    b = tonumber(b)
  elseif type(a) == "string" and type(b) == "number" then
    a = tonumber(a)
  end
  if op == "lt" then
    return a < b
  end
  if op == "le" then
    return a <= b
  end
  if op == "gt" then
    return a > b
  end
  return a >= b
end
function redsym.denull (val)
  if val == cjson.null then
    return nil
  end
  if type(val) == "table" then
    for k, v in pairs(val) do
      val[k] = redsym.denull(v)
    end
  end
  return val
end
-- HELPERS END --
-- args: a, b
local __argv = redsym.denull(cjson.decode(ARGV[1]))
local arg_0 = __argv[1]  -- a
local arg_1 = __argv[2]  -- b
local var_0 = 5
local var_1 = 0
if redsym.cmp("ge", (arg_0 + arg_1), 10) then
  var_0 = (arg_0 - arg_1)
  var_1 = 2.5
else
  var_1 = 7.5
end
return cjson.encode((var_0 + var_1))
"#;
    assert_eq!(compiled.lua, expected);
}

#[test]
fn redis_calls_share_the_direct_dispatch() {
    let ctx = FnContext::new();
    let key = ctx.add_key("list");
    let rlist = RedisList::new(key);
    ctx.add(rlist.rpush(vec![Sym::lit("a"), Sym::lit("b"), Sym::lit("c")]));
    ctx.set_return_value(rlist.lpop());
    let mut registry = ScriptRegistry::new();
    let mut store = Store::new();
    let res = run(&mut registry, &ctx, &mut store, &[("list", "mylist")], &[]);
    assert_eq!(res, Value::from("a"));
    assert_eq!(store.llen("mylist", 0).unwrap(), 2);
}

#[test]
fn pop_on_missing_key_is_null_in_scripts() {
    let ctx = FnContext::new();
    let key = ctx.add_key("list");
    let rlist = RedisList::new(key);
    ctx.set_return_value(rlist.lpop());
    let mut registry = ScriptRegistry::new();
    let mut store = Store::new();
    let res = run(&mut registry, &ctx, &mut store, &[("list", "nothing")], &[]);
    assert_eq!(res, Value::Null);
}

#[test]
fn empty_hash_return_collapses_to_null() {
    let ctx = FnContext::new();
    let key = ctx.add_key("hash");
    let rhash = RedisHash::new(key);
    ctx.set_return_value(rhash.hgetall());
    let mut registry = ScriptRegistry::new();
    let mut store = Store::new();
    let res = run(&mut registry, &ctx, &mut store, &[("hash", "missing")], &[]);
    assert_eq!(res, Value::Null);
}

#[test]
fn hgetall_returns_a_map() {
    let ctx = FnContext::new();
    let key = ctx.add_key("hash");
    let rhash = RedisHash::new(key);
    ctx.set_return_value(rhash.hgetall());
    let mut registry = ScriptRegistry::new();
    let mut store = Store::new();
    store
        .hset(
            "h",
            &[
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ],
            0,
        )
        .unwrap();
    let res = run(&mut registry, &ctx, &mut store, &[("hash", "h")], &[]);
    let Value::Map(map) = res else {
        panic!("expected a map, got {res:?}");
    };
    assert_eq!(map.get("a"), Some(&Value::from("1")));
    assert_eq!(map.get("b"), Some(&Value::from("2")));
}

#[test]
fn while_loop_with_break_and_continue() {
    // Sums 0..10 skipping multiples of 3, stopping at 8.
    let ctx = FnContext::new();
    let i = ctx.add_local(0);
    let total = ctx.add_local(0);
    let body = ctx.while_(i.sym().lt_(10));
    body.add(i.assign(i.sym() + 1));
    let (stop, _) = body.if_(i.sym().gt_(8));
    stop.add(break_loop());
    let (skip, _) = body.if_((i.sym() % 3).eq_(0));
    skip.add(continue_loop());
    body.add(total.assign(total.sym() + i.sym()));
    ctx.set_return_value(total.sym());
    let mut registry = ScriptRegistry::new();
    let mut store = Store::new();
    let res = run(&mut registry, &ctx, &mut store, &[], &[]);
    // 1 + 2 + 4 + 5 + 7 + 8
    assert_eq!(res, Value::Int(27));
}

#[test]
fn continue_lowers_to_the_repeat_wrapper() {
    let ctx = FnContext::new();
    let i = ctx.add_local(0);
    let body = ctx.while_(i.sym().lt_(3));
    body.add(i.assign(i.sym() + 1));
    let (skip, _) = body.if_(i.sym().eq_(1));
    skip.add(continue_loop());
    ctx.set_return_value(i.sym());
    let mut registry = ScriptRegistry::new();
    let compiled = registry.compile(ctx.compile().unwrap()).unwrap();
    assert!(compiled.lua.contains("repeat"));
    assert!(compiled.lua.contains("until true"));
    assert!(compiled.lua.contains("do break end"));
    assert!(!compiled.lua.contains("__brk"));
}

#[test]
fn for_loop_reads_zero_based_indices() {
    let ctx = FnContext::new();
    let items = ctx.add_arg("items");
    let acc = ctx.add_local(0);
    let (body, ix, val) = ctx.for_(items);
    body.add(acc.assign(acc.sym() + ix + val));
    ctx.set_return_value(acc.sym());
    let mut registry = ScriptRegistry::new();
    let compiled = registry.compile(ctx.compile().unwrap()).unwrap();
    assert!(compiled.lua.contains("for ix_0, val_0 in ipairs(arg_0) do"));
    assert!(compiled.lua.contains("(ix_0 - 1)"));

    let mut store = Store::new();
    let res = registry
        .run_local(
            &compiled,
            &mut store,
            0,
            &[],
            &[Value::List(vec![
                Value::Int(10),
                Value::Int(20),
                Value::Int(30),
            ])],
        )
        .unwrap();
    // indices 0 + 1 + 2 plus values 10 + 20 + 30
    assert_eq!(res, Value::Int(63));
}

#[test]
fn registration_caches_by_content_hash() {
    let mut registry = ScriptRegistry::new();
    let first = registry.compile(arithmetic_ctx().compile().unwrap()).unwrap();
    let second = registry.compile(arithmetic_ctx().compile().unwrap()).unwrap();
    assert_eq!(first.digest, second.digest);
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn binding_is_by_name_and_strict() {
    let ctx = FnContext::new();
    let _ = ctx.add_key("k");
    let _ = ctx.add_arg("a");
    ctx.set_return_value(Sym::null());
    let script = ctx.compile().unwrap();

    let keys: HashMap<String, String> = [("k".to_string(), "key".to_string())].into();
    let args: HashMap<String, Value> = [("a".to_string(), Value::Int(1))].into();
    assert!(bind_call(&script, &keys, &args).is_ok());

    let missing: HashMap<String, Value> = HashMap::new();
    assert!(bind_call(&script, &keys, &missing).is_err());

    let unknown: HashMap<String, Value> =
        [("a".to_string(), Value::Int(1)), ("b".to_string(), Value::Int(2))].into();
    assert!(bind_call(&script, &keys, &unknown).is_err());
}

#[test]
fn unknown_operations_fail_at_registration() {
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(call_plugin("no_such_op", vec![key]));
    let script = ctx.compile().unwrap();
    let mut registry = ScriptRegistry::new();
    assert!(registry.compile(script).is_err());
}

struct DoubleIncr;

impl PluginFunction for DoubleIncr {
    fn name(&self) -> &'static str {
        "double_incr"
    }

    fn arity(&self) -> Arity {
        Arity::exact(2)
    }

    fn call(
        &self,
        store: &mut Store,
        now_ms: u64,
        args: &[Value],
    ) -> Result<Value, redsym_core::RedisError> {
        let key = args[0].to_display_string();
        let by = args[1].coerce_int()?;
        Ok(Value::Int(store.incrby(&key, by * 2, now_ms)?))
    }

    fn emit(&self, args: Vec<Expr>, _is_expr_stmt: bool) -> Expr {
        let mut call_args = vec![args[0].clone()];
        call_args.push(Expr::Binary {
            op: redsym_core::ir::BinOp::Mul,
            left: Box::new(args[1].clone()),
            right: Box::new(Expr::Lit(Value::Int(2))),
        });
        Expr::Call {
            kind: CallKind::Redis,
            name: "incrby".to_string(),
            args: call_args,
            raw: false,
        }
    }
}

#[test]
fn plugins_run_locally_and_emit_lua() {
    let ctx = FnContext::new();
    let key = ctx.add_key("counter");
    ctx.set_return_value(call_plugin("double_incr", vec![key, Sym::lit(3)]));
    let mut registry = ScriptRegistry::new();
    registry.plugins_mut().add_plugin(Rc::new(DoubleIncr)).unwrap();
    let compiled = registry.compile(ctx.compile().unwrap()).unwrap();
    assert!(compiled.lua.contains("redis.call(\"incrby\", key_0, (3 * 2))"));

    let mut store = Store::new();
    let res = registry
        .run_local(&compiled, &mut store, 0, &["cnt".to_string()], &[])
        .unwrap();
    assert_eq!(res, Value::Int(6));
    assert_eq!(store.get("cnt", 0).unwrap(), Some("6".to_string()));
}

#[test]
fn script_incrby_rejects_non_integer_values() {
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(redis_fn("incrby", key, vec![Sym::lit(1)]));
    let mut registry = ScriptRegistry::new();
    let compiled = registry.compile(ctx.compile().unwrap()).unwrap();
    // The emitted program uses the integer command, so a live server rejects
    // the same values the interpreter does.
    assert!(compiled.lua.contains("redis.call(\"incrby\", key_0, 1)"));

    let mut store = Store::new();
    store
        .set("cnt", "2.5".to_string(), &redsym_store::SetOptions::default(), 0)
        .unwrap();
    let err = registry
        .run_local(&compiled, &mut store, 0, &["cnt".to_string()], &[])
        .unwrap_err();
    assert!(
        matches!(&err, redsym_core::RedisError::Script(msg) if msg.contains("not an integer")),
        "unexpected error: {err:?}"
    );
    // The stored value is untouched.
    assert_eq!(store.get("cnt", 0).unwrap(), Some("2.5".to_string()));
}

#[test]
fn get_is_nil_repaired_in_lua() {
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(redis_fn("get", key, Vec::new()));
    let mut registry = ScriptRegistry::new();
    let compiled = registry.compile(ctx.compile().unwrap()).unwrap();
    assert!(compiled.lua.contains("redsym.nofalse(redis.call(\"get\", key_0))"));
}
