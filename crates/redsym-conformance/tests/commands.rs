use pretty_assertions::assert_eq;

use redsym_client::{Client, SetMode};
use redsym_core::RedisError;
use redsym_store::SetOptions;

#[test]
fn set_get_roundtrip() {
    let rt = Client::memory();
    assert!(rt.set("foo", "bar").unwrap());
    assert_eq!(rt.get("foo").unwrap(), Some("bar".to_string()));
    assert_eq!(rt.get("nope").unwrap(), None);
}

#[test]
fn set_modes_and_previous_value() {
    let rt = Client::memory();
    let nx = SetOptions {
        mode: SetMode::IfMissing,
        ..SetOptions::default()
    };
    let xx = SetOptions {
        mode: SetMode::IfExists,
        ..SetOptions::default()
    };
    assert!(!rt.set_opts("k", "a", &xx).unwrap());
    assert!(rt.set_opts("k", "a", &nx).unwrap());
    assert!(!rt.set_opts("k", "b", &nx).unwrap());
    assert_eq!(rt.get("k").unwrap(), Some("a".to_string()));
    assert_eq!(
        rt.set_get("k", "c", &SetOptions::default()).unwrap(),
        Some("a".to_string())
    );
    assert_eq!(rt.get("k").unwrap(), Some("c".to_string()));
}

#[test]
fn incr_family() {
    let rt = Client::memory();
    assert_eq!(rt.incrby("n", 2).unwrap(), 2);
    assert_eq!(rt.incrby("n", -5).unwrap(), -3);
    rt.set("s", "abc").unwrap();
    assert_eq!(rt.incrby("s", 1), Err(RedisError::NotInteger));
    assert_eq!(rt.incrbyfloat("f", 1.5).unwrap(), 1.5);
}

#[test]
fn list_commands() {
    let rt = Client::memory();
    assert_eq!(rt.rpush("l", &["a", "b", "c", "d"]).unwrap(), 4);
    assert_eq!(rt.llen("l").unwrap(), 4);
    assert_eq!(
        rt.lrange("l", 0, -1).unwrap(),
        vec!["a", "b", "c", "d"]
    );
    assert_eq!(rt.lindex("l", 1).unwrap(), Some("b".to_string()));
    assert_eq!(rt.lindex("l", -1).unwrap(), Some("d".to_string()));
    assert_eq!(rt.lpop("l").unwrap(), Some("a".to_string()));
    assert_eq!(
        rt.rpop_count("l", 2).unwrap(),
        Some(vec!["d".to_string(), "c".to_string()])
    );
    assert_eq!(rt.lpop_count("l", 5).unwrap(), Some(vec!["b".to_string()]));
    // The emptied list is gone entirely.
    assert_eq!(rt.exists(&["l"]).unwrap(), 0);
    assert_eq!(rt.lpop("l").unwrap(), None);
    assert_eq!(rt.lpop_count("l", 3).unwrap(), None);
}

#[test]
fn hash_commands() {
    let rt = Client::memory();
    assert_eq!(rt.hset("h", &[("a", "1"), ("b", "2")]).unwrap(), 2);
    assert_eq!(rt.hset("h", &[("b", "3"), ("c", "4")]).unwrap(), 1);
    assert_eq!(rt.hget("h", "b").unwrap(), Some("3".to_string()));
    assert_eq!(rt.hget("h", "x").unwrap(), None);
    assert_eq!(rt.hkeys("h").unwrap(), vec!["a", "b", "c"]);
    assert_eq!(rt.hvals("h").unwrap(), vec!["1", "3", "4"]);
    assert_eq!(
        rt.hmget("h", &["a", "x", "c"]).unwrap(),
        vec![Some("1".to_string()), None, Some("4".to_string())]
    );
    let all = rt.hgetall("h").unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all.get("c"), Some(&"4".to_string()));
    assert_eq!(rt.hincrby("h", "a", 2.0).unwrap(), 3.0);
    assert_eq!(rt.hdel("h", &["a", "b", "c"]).unwrap(), 3);
    assert_eq!(rt.exists(&["h"]).unwrap(), 0);
}

#[test]
fn set_commands() {
    let rt = Client::memory();
    assert_eq!(rt.sadd("s", &["b", "a", "b"]).unwrap(), 2);
    assert!(rt.sismember("s", "a").unwrap());
    assert!(!rt.sismember("s", "z").unwrap());
    assert_eq!(rt.scard("s").unwrap(), 2);
    assert_eq!(rt.smembers("s").unwrap(), vec!["a", "b"]);
    assert_eq!(rt.srem("s", &["a", "b"]).unwrap(), 2);
    assert_eq!(rt.exists(&["s"]).unwrap(), 0);
}

#[test]
fn zset_commands() {
    let rt = Client::memory();
    assert_eq!(
        rt.zadd("z", &[("a", 5.0), ("b", 6.0), ("c", 4.0)]).unwrap(),
        3
    );
    assert_eq!(rt.zadd("z", &[("a", 0.0)]).unwrap(), 0);
    assert_eq!(rt.zcard("z").unwrap(), 3);
    assert_eq!(rt.zrange("z", 0, -1).unwrap(), vec!["a", "c", "b"]);
    assert_eq!(rt.zscore("z", "c").unwrap(), Some(4.0));
    assert_eq!(rt.zscore("z", "x").unwrap(), None);
    assert_eq!(rt.zpop_min("z", 1).unwrap(), vec![("a".to_string(), 0.0)]);
    assert_eq!(rt.zpop_max("z", 1).unwrap(), vec![("b".to_string(), 6.0)]);
    assert_eq!(rt.zrem("z", &["c"]).unwrap(), 1);
    assert_eq!(rt.exists(&["z"]).unwrap(), 0);
    assert_eq!(rt.zpop_min("z", 1).unwrap(), Vec::new());
}

#[test]
fn zadd_ties_break_lexicographically() {
    let rt = Client::memory();
    rt.zadd("z", &[("delta", 1.0), ("alpha", 1.0), ("beta", 1.0)])
        .unwrap();
    assert_eq!(rt.zrange("z", 0, -1).unwrap(), vec!["alpha", "beta", "delta"]);
    assert_eq!(
        rt.zpop_min("z", 2).unwrap(),
        vec![("alpha".to_string(), 1.0), ("beta".to_string(), 1.0)]
    );
}

#[test]
fn key_commands() {
    let rt = Client::memory();
    rt.set("a", "1").unwrap();
    rt.rpush("b", &["x"]).unwrap();
    rt.hset("c", &[("f", "v")]).unwrap();
    assert_eq!(rt.exists(&["a", "b", "c", "d"]).unwrap(), 3);
    assert_eq!(rt.key_type("a").unwrap(), Some("string".to_string()));
    assert_eq!(rt.key_type("b").unwrap(), Some("list".to_string()));
    assert_eq!(rt.key_type("c").unwrap(), Some("hash".to_string()));
    assert_eq!(rt.key_type("d").unwrap(), None);
    assert_eq!(rt.keys(None).unwrap(), vec!["a", "b", "c"]);
    assert_eq!(rt.del(&["a", "d"]).unwrap(), 1);
    assert_eq!(rt.keys(Some("[bc]")).unwrap(), vec!["b", "c"]);
    rt.flushall().unwrap();
    assert_eq!(rt.keys(None).unwrap(), Vec::<String>::new());
}

#[test]
fn scan_covers_the_keyspace() {
    let rt = Client::memory();
    for i in 0..12 {
        rt.set(&format!("user:{i}"), "x").unwrap();
    }
    rt.set("other", "y").unwrap();
    let mut found = Vec::new();
    let mut cursor = "0".to_string();
    loop {
        let (next, keys) = rt.scan(&cursor, Some("user:*"), Some(4)).unwrap();
        found.extend(keys);
        if next == "0" {
            break;
        }
        cursor = next;
    }
    found.sort();
    found.dedup();
    assert_eq!(found.len(), 12);
}

#[test]
fn wrong_type_errors_are_typed() {
    let rt = Client::memory();
    rt.set("k", "v").unwrap();
    assert_eq!(rt.lpush("k", &["x"]), Err(RedisError::TypeMismatch));
    assert_eq!(rt.hget("k", "f"), Err(RedisError::TypeMismatch));
    assert_eq!(rt.sadd("k", &["m"]), Err(RedisError::TypeMismatch));
    assert_eq!(rt.zcard("k"), Err(RedisError::TypeMismatch));
}
