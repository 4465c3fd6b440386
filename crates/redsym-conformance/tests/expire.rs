use std::thread::sleep;
use std::time::Duration;

use pretty_assertions::assert_eq;

use redsym_client::Client;

#[test]
fn pexpire_deletes_after_the_deadline() {
    let rt = Client::memory();
    rt.set("k", "v").unwrap();
    assert!(rt.pexpire("k", 1).unwrap());
    sleep(Duration::from_millis(10));
    assert_eq!(rt.exists(&["k"]).unwrap(), 0);
    assert_eq!(rt.ttl("k").unwrap(), -2);
}

#[test]
fn ttl_stays_within_the_requested_window() {
    let rt = Client::memory();
    rt.set("k", "v").unwrap();
    assert!(rt.expire("k", 5).unwrap());
    let ttl = rt.ttl("k").unwrap();
    assert!((0..=5).contains(&ttl), "ttl out of window: {ttl}");
    let pttl = rt.pttl("k").unwrap();
    assert!((0..=5_000).contains(&pttl), "pttl out of window: {pttl}");
}

#[test]
fn persist_clears_the_deadline() {
    let rt = Client::memory();
    rt.set("k", "v").unwrap();
    rt.expire("k", 5).unwrap();
    assert!(rt.persist("k").unwrap());
    assert_eq!(rt.ttl("k").unwrap(), -1);
    assert!(!rt.persist("k").unwrap());
}

#[test]
fn non_positive_expire_deletes_now() {
    let rt = Client::memory();
    rt.set("k", "v").unwrap();
    assert!(rt.expire("k", 0).unwrap());
    assert_eq!(rt.exists(&["k"]).unwrap(), 0);

    rt.set("k", "v").unwrap();
    assert!(rt.pexpire("k", -5).unwrap());
    assert_eq!(rt.exists(&["k"]).unwrap(), 0);
}

#[test]
fn expire_on_a_missing_key_reports_failure() {
    let rt = Client::memory();
    assert!(!rt.expire("gone", 5).unwrap());
    assert!(!rt.persist("gone").unwrap());
    assert_eq!(rt.ttl("gone").unwrap(), -2);
}

#[test]
fn ttl_without_expiry_is_minus_one() {
    let rt = Client::memory();
    rt.set("k", "v").unwrap();
    assert_eq!(rt.ttl("k").unwrap(), -1);
    assert_eq!(rt.pttl("k").unwrap(), -1);
}

#[test]
fn set_px_and_keepttl_interact() {
    let rt = Client::memory();
    let px = redsym_store::SetOptions {
        expire_in_ms: Some(5_000),
        ..redsym_store::SetOptions::default()
    };
    let keep = redsym_store::SetOptions {
        keep_ttl: true,
        ..redsym_store::SetOptions::default()
    };
    rt.set_opts("k", "a", &px).unwrap();
    rt.set_opts("k", "b", &keep).unwrap();
    assert!(rt.ttl("k").unwrap() >= 0);
    rt.set("k", "c").unwrap();
    assert_eq!(rt.ttl("k").unwrap(), -1);
}
