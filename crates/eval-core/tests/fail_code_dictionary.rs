mod test_support;

use std::sync::Arc;
use std::thread;

use eval_core::store::FailCodeStore;
use eval_domain::Role;
use test_support::Harness;

#[test]
fn concurrent_resolve_converges_on_one_row() {
    let h = Harness::new();
    let dict = Arc::new(h.svc.fail_codes.clone());
    let handles: Vec<_> = (0..8).map(|_| {
                                    let d = dict.clone();
                                    thread::spawn(move || d.resolve("SN-999").unwrap())
                                })
                                .collect();
    let ids: Vec<i64> = handles.into_iter().map(|t| t.join().unwrap().id).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    let all = h.store.list_codes(false).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].code, "SN-999");
}

#[test]
fn mining_and_promotion() {
    let h = Harness::new();
    let leader = h.user("gl", Role::GroupLeader);
    let plain = h.user("u", Role::User);

    let mined = h.svc.fail_codes.mine_text("M031 fail 201 with 短路 after AGING").unwrap();
    let codes: Vec<&str> = mined.iter().map(|m| m.code.as_str()).collect();
    assert!(codes.contains(&"201"));
    assert!(codes.iter().any(|c| c.starts_with("LEGACY-ZH")));
    assert!(!codes.contains(&"AGING"));

    assert!(h.svc.fail_codes.promote(&plain.principal(), "201", None, None).is_err());
    let official = h.svc.fail_codes.promote(&leader.principal(), "201", Some("Open".into()), None).unwrap();
    assert!(!official.is_provisional);
    assert_eq!(h.svc.fail_codes.resolve("201").unwrap().id, official.id);
    assert!(!h.svc.fail_codes.find("201").unwrap().unwrap().is_provisional);
}
