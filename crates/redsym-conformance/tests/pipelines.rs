use pretty_assertions::assert_eq;

use redsym_client::Client;
use redsym_conformance::filter_list;
use redsym_core::{RedisError, Value};
use redsym_script::{FnContext, RedisVar};

#[test]
fn results_align_with_enqueue_order() {
    let rt = Client::memory();
    rt.rpush("foo", &["a", "b", "c", "d"]).unwrap();
    rt.rpush("bar", &["e", "f", "g"]).unwrap();

    let mut pipe = rt.pipeline();
    pipe.lpop_count("foo", 3);
    pipe.rpop("bar");
    pipe.rpush("baz", &["h"]);
    let results = pipe.execute();

    assert_eq!(
        results,
        vec![
            Ok(Value::List(vec![
                Value::from("a"),
                Value::from("b"),
                Value::from("c"),
            ])),
            Ok(Value::from("g")),
            Ok(Value::Int(1)),
        ]
    );
    // The post-state equals running the same commands sequentially.
    assert_eq!(rt.lrange("foo", 0, -1).unwrap(), vec!["d"]);
    assert_eq!(rt.lrange("bar", 0, -1).unwrap(), vec!["e", "f"]);
    assert_eq!(rt.lrange("baz", 0, -1).unwrap(), vec!["h"]);
}

#[test]
fn commands_buffer_until_execute() {
    let rt = Client::memory();
    let mut pipe = rt.pipeline();
    pipe.set("k", "v");
    assert_eq!(rt.exists(&["k"]).unwrap(), 0);
    assert_eq!(pipe.len(), 1);
    let results = pipe.execute();
    assert_eq!(results.len(), 1);
    assert_eq!(rt.get("k").unwrap(), Some("v".to_string()));
    assert!(pipe.is_empty());
}

#[test]
fn a_failed_slot_does_not_abort_the_rest() {
    let rt = Client::memory();
    let mut pipe = rt.pipeline();
    pipe.set("a", "1");
    pipe.lpush("a", &["x"]);
    pipe.get("a");
    let results = pipe.execute();
    assert_eq!(
        results,
        vec![
            Ok(Value::Bool(true)),
            Err(RedisError::TypeMismatch),
            Ok(Value::from("1")),
        ]
    );
}

#[test]
fn zset_commands_through_a_pipeline() {
    let rt = Client::memory();
    rt.zadd("z", &[("a", 5.0), ("b", 6.0), ("c", 4.0)]).unwrap();
    let mut pipe = rt.pipeline();
    pipe.zadd("z", &[("a", 0.0), ("d", 1.0)]);
    pipe.zpop_min("z", 1);
    pipe.zpop_max("z", 1);
    pipe.zcard("z");
    let results = pipe.execute();
    assert_eq!(
        results,
        vec![
            Ok(Value::Int(1)),
            Ok(Value::List(vec![Value::List(vec![
                Value::from("a"),
                Value::Float(0.0),
            ])])),
            Ok(Value::List(vec![Value::List(vec![
                Value::from("b"),
                Value::Float(6.0),
            ])])),
            Ok(Value::Int(2)),
        ]
    );
}

#[test]
fn scripts_record_their_result_in_position() {
    let rt = Client::memory();
    rt.rpush("mylist", &["1", "3", "2", "4"]).unwrap();
    let script = filter_list(&rt).unwrap();

    let mut pipe = rt.pipeline();
    pipe.llen("mylist");
    pipe.script(
        &script,
        &redsym_client::keys_of(&[("inp", "mylist"), ("left", "small"), ("right", "big")]),
        &redsym_client::args_of(&[("cmp", Value::Int(3))]),
    );
    pipe.llen("small");
    let results = pipe.execute();
    assert_eq!(
        results,
        vec![Ok(Value::Int(4)), Ok(Value::Null), Ok(Value::Int(2))]
    );
}

#[test]
fn script_binding_errors_land_in_their_slot() {
    let rt = Client::memory();
    let ctx = FnContext::new();
    let var = RedisVar::new(ctx.add_key("k"));
    ctx.set_return_value(var.get());
    let script = rt.register_script(&ctx).unwrap();

    let mut pipe = rt.pipeline();
    pipe.set("a", "1");
    pipe.script(&script, &redsym_client::keys_of(&[]), &redsym_client::args_of(&[]));
    pipe.get("a");
    let results = pipe.execute();
    assert_eq!(results[0], Ok(Value::Bool(true)));
    assert!(matches!(results[1], Err(RedisError::Arity(_))));
    assert_eq!(results[2], Ok(Value::from("1")));
}
