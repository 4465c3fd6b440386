//! Backend-equivalence suites against a live Redis server. Every assertion
//! here runs the memory backend and the external backend side by side and
//! expects identical observable behavior. The suites are ignored by default;
//! run them with `cargo test -- --ignored` against a disposable server.

use pretty_assertions::assert_eq;

use redsym_client::{Client, RedisConfig, args_of, keys_of};
use redsym_conformance::{RStack, filter_list};
use redsym_core::Value;
use redsym_script::{FnContext, RedisList};

fn live() -> Client {
    let mut cfg = RedisConfig::new("localhost", 6379);
    cfg.prefix = "redsym-test:".to_string();
    let client = Client::external(&cfg).expect("test server reachable");
    client.flushall().expect("flushall");
    client
}

fn both() -> Vec<Client> {
    vec![Client::memory(), live()]
}

#[test]
#[ignore = "requires a running redis server on localhost:6379"]
fn direct_commands_agree_across_backends() {
    for rt in both() {
        rt.rpush("l", &["a", "b", "c"]).unwrap();
        assert_eq!(rt.lpop("l").unwrap(), Some("a".to_string()));
        assert_eq!(rt.lrange("l", 0, -1).unwrap(), vec!["b", "c"]);
        assert_eq!(rt.lpop_count("l", 5).unwrap(), Some(vec!["b".to_string(), "c".to_string()]));
        assert_eq!(rt.lpop("l").unwrap(), None);
        assert_eq!(rt.exists(&["l"]).unwrap(), 0);

        rt.hset("h", &[("b", "2"), ("a", "1")]).unwrap();
        assert_eq!(rt.hkeys("h").unwrap(), vec!["a", "b"]);
        assert_eq!(rt.hget("h", "x").unwrap(), None);

        rt.zadd("z", &[("b", 1.0), ("a", 1.0)]).unwrap();
        assert_eq!(rt.zrange("z", 0, -1).unwrap(), vec!["a", "b"]);
        assert_eq!(
            rt.zpop_min("z", 2).unwrap(),
            vec![("a".to_string(), 1.0), ("b".to_string(), 1.0)]
        );
    }
}

#[test]
#[ignore = "requires a running redis server on localhost:6379"]
fn filter_list_agrees_across_backends() {
    for rt in both() {
        rt.rpush("mylist", &["1", "3", "2", "4"]).unwrap();
        let script = filter_list(&rt).unwrap();
        let res = script
            .run(
                &keys_of(&[("inp", "mylist"), ("left", "small"), ("right", "big")]),
                &args_of(&[("cmp", Value::Int(3))]),
            )
            .unwrap();
        assert_eq!(res, Value::Null);
        assert_eq!(rt.lrange("mylist", 0, -1).unwrap(), Vec::<String>::new());
        assert_eq!(rt.lrange("small", 0, -1).unwrap(), vec!["1", "2"]);
        assert_eq!(rt.lrange("big", 0, -1).unwrap(), vec!["3", "4"]);
    }
}

#[test]
#[ignore = "requires a running redis server on localhost:6379"]
fn stack_agrees_across_backends() {
    for rt in both() {
        let stack = RStack::new(&rt).unwrap();
        stack.set_value("s", "a", "1").unwrap();
        stack.push_frame("s").unwrap();
        stack.set_value("s", "b", "2").unwrap();
        assert_eq!(stack.get_cascading("s", "a").unwrap(), Value::from("1"));
        assert_eq!(stack.get_cascading("s", "b").unwrap(), Value::from("2"));
        assert_eq!(stack.get_cascading("s", "c").unwrap(), Value::Null);
        let top = stack.pop_frame("s").unwrap();
        assert_eq!(top.get("b"), Some(&"2".to_string()));
    }
}

#[test]
#[ignore = "requires a running redis server on localhost:6379"]
fn script_pop_on_empty_is_null_across_backends() {
    for rt in both() {
        let ctx = FnContext::new();
        let list = RedisList::new(ctx.add_key("k"));
        ctx.set_return_value(list.lpop());
        let script = rt.register_script(&ctx).unwrap();
        let res = script
            .run(&keys_of(&[("k", "absent")]), &args_of(&[]))
            .unwrap();
        assert_eq!(res, Value::Null);
    }
}

#[test]
#[ignore = "requires a running redis server on localhost:6379"]
fn argument_numbers_round_trip_across_backends() {
    for rt in both() {
        let ctx = FnContext::new();
        let n = ctx.add_arg("n");
        ctx.set_return_value(n + 1);
        let script = rt.register_script(&ctx).unwrap();
        let res = script
            .run(&keys_of(&[]), &args_of(&[("n", Value::Int(-3))]))
            .unwrap();
        assert_eq!(res, Value::Int(-2));
        let res = script
            .run(&keys_of(&[]), &args_of(&[("n", Value::Float(0.5))]))
            .unwrap();
        assert_eq!(res, Value::Float(1.5));
    }
}
