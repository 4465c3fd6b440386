use pretty_assertions::assert_eq;

use redsym_client::{Client, args_of, keys_of};
use redsym_conformance::{RStack, filter_list};
use redsym_core::Value;
use redsym_script::{FnContext, RedisHash, RedisList};

#[test]
fn filter_list_splits_on_the_pivot() {
    let rt = Client::memory();
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
    // The drained input list no longer exists.
    assert_eq!(rt.exists(&["mylist"]).unwrap(), 0);
}

#[test]
fn stack_values_shadow_by_frame() {
    let rt = Client::memory();
    let stack = RStack::new(&rt).unwrap();
    stack.set_value("s", "a", "1").unwrap();
    stack.push_frame("s").unwrap();
    stack.set_value("s", "b", "2").unwrap();

    assert_eq!(stack.get_value("s", "b").unwrap(), Value::from("2"));
    assert_eq!(stack.get_value("s", "a").unwrap(), Value::Null);

    assert_eq!(stack.get_cascading("s", "a").unwrap(), Value::from("1"));
    assert_eq!(stack.get_cascading("s", "b").unwrap(), Value::from("2"));
    assert_eq!(stack.get_cascading("s", "c").unwrap(), Value::Null);
}

#[test]
fn stack_pop_returns_the_frame_contents() {
    let rt = Client::memory();
    let stack = RStack::new(&rt).unwrap();
    stack.set_value("s", "a", "1").unwrap();
    stack.push_frame("s").unwrap();
    stack.set_value("s", "b", "2").unwrap();
    stack.set_value("s", "c", "3").unwrap();

    let top = stack.pop_frame("s").unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top.get("b"), Some(&"2".to_string()));
    assert_eq!(top.get("c"), Some(&"3".to_string()));

    // Back in the base frame.
    assert_eq!(stack.get_value("s", "a").unwrap(), Value::from("1"));
    let base = stack.pop_frame("s").unwrap();
    assert_eq!(base.get("a"), Some(&"1".to_string()));

    // Popping an empty stack yields nothing.
    assert_eq!(stack.pop_frame("s").unwrap().len(), 0);
}

#[test]
fn lpop_is_null_in_both_surfaces() {
    let rt = Client::memory();
    assert_eq!(rt.lpop("gone").unwrap(), None);

    let ctx = FnContext::new();
    let list = RedisList::new(ctx.add_key("k"));
    ctx.set_return_value(list.lpop());
    let script = rt.register_script(&ctx).unwrap();
    let res = script
        .run(&keys_of(&[("k", "gone")]), &args_of(&[]))
        .unwrap();
    assert_eq!(res, Value::Null);
}

#[test]
fn empty_hash_script_return_collapses() {
    let rt = Client::memory();
    let ctx = FnContext::new();
    let hash = RedisHash::new(ctx.add_key("h"));
    ctx.set_return_value(hash.hgetall());
    let script = rt.register_script(&ctx).unwrap();
    let res = script
        .run(&keys_of(&[("h", "missing")]), &args_of(&[]))
        .unwrap();
    assert_eq!(res, Value::Null);
}

#[test]
fn script_state_matches_direct_commands() {
    // The same mutation through the script path and the direct path leaves
    // the engine in the same observable state.
    let direct = Client::memory();
    direct.rpush("l", &["10", "20"]).unwrap();
    direct.lpop("l").unwrap();

    let scripted = Client::memory();
    scripted.rpush("l", &["10", "20"]).unwrap();
    let ctx = FnContext::new();
    let list = RedisList::new(ctx.add_key("l"));
    ctx.set_return_value(list.lpop());
    let script = scripted.register_script(&ctx).unwrap();
    script.run(&keys_of(&[("l", "l")]), &args_of(&[])).unwrap();

    assert_eq!(
        direct.lrange("l", 0, -1).unwrap(),
        scripted.lrange("l", 0, -1).unwrap()
    );
    assert_eq!(direct.llen("l").unwrap(), scripted.llen("l").unwrap());
}
