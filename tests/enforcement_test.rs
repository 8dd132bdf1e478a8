//! End-to-end enforcement pipeline tests.
//!
//! Each test drives the public API the way an embedding server would: load
//! a rule graph through a loader, then evaluate requests against it.

use chrono::{DateTime, NaiveTime, TimeZone, Utc};

use routeguard::model::{
    BlacklistEntry, ConcurrentLimit, CustomResponse, FilterKind, IpFilter, RateLimit,
    ResponseFormat, Route, Rule, TimeRestriction,
};
use routeguard::pipeline::{BlockReason, Enforcer, RequestInfo, Verdict};
use routeguard::store::{SnapshotData, StaticLoader};

fn at(h: u32, m: u32) -> DateTime<Utc> {
    // 2024-06-03 is a Monday.
    Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn enforcer_with(data: SnapshotData) -> Enforcer {
    let enforcer = Enforcer::new();
    enforcer.reload(&StaticLoader::new(data)).unwrap();
    enforcer
}

fn get(path: &str, ip: &str) -> RequestInfo {
    RequestInfo::new("GET", path).with_peer_addr(ip)
}

fn expect_block(verdict: Verdict, reason: BlockReason) -> routeguard::pipeline::BlockResponse {
    match verdict {
        Verdict::Blocked(response) => {
            assert_eq!(response.reason, reason);
            response
        },
        Verdict::Allowed { .. } => panic!("expected {reason:?} block"),
    }
}

#[test]
fn rate_limit_gradual_refill() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        rate_limits: vec![RateLimit::new(1, 1, 2, 1)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    let t0 = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
    let req = get("/api/data", "1.2.3.4");

    // Two at t=0 pass; a third within the same second is rejected.
    assert!(enforcer.evaluate_at(&req, t0).is_allowed());
    assert!(enforcer.evaluate_at(&req, t0).is_allowed());
    expect_block(enforcer.evaluate_at(&req, t0), BlockReason::RateLimitExceeded);

    // A window later the bucket refilled.
    let t1 = t0 + chrono::Duration::seconds(1);
    assert!(enforcer.evaluate_at(&req, t1).is_allowed());
}

#[test]
fn cidr_blacklist_with_hole() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        ip_filters: vec![IpFilter::new(1, 1, "10.0.0.0/8", FilterKind::Blacklist)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    expect_block(
        enforcer.evaluate_at(&get("/api/data", "10.1.2.3"), at(12, 0)),
        BlockReason::IpBlacklisted,
    );
    assert!(enforcer
        .evaluate_at(&get("/api/data", "192.168.0.1"), at(12, 0))
        .is_allowed());
    expect_block(
        enforcer.evaluate_at(&get("/api/data", "10.255.255.255"), at(12, 0)),
        BlockReason::IpBlacklisted,
    );
}

#[test]
fn whitelist_without_match() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        ip_filters: vec![IpFilter::new(1, 1, "192.168.1.100", FilterKind::Whitelist)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    assert!(enforcer
        .evaluate_at(&get("/api/data", "192.168.1.100"), at(12, 0))
        .is_allowed());
    expect_block(
        enforcer.evaluate_at(&get("/api/data", "192.168.1.101"), at(12, 0)),
        BlockReason::IpNotWhitelisted,
    );
}

#[test]
fn higher_priority_rule_blocks_first() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 5), Rule::new(2, 1, 10)],
        ip_filters: vec![IpFilter::new(1, 2, "1.2.3.4", FilterKind::Blacklist)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    let response = expect_block(
        enforcer.evaluate_at(&get("/api/data", "1.2.3.4"), at(12, 0)),
        BlockReason::IpBlacklisted,
    );
    assert_eq!(response.rule_id, Some(2));

    assert!(enforcer
        .evaluate_at(&get("/api/data", "5.6.7.8"), at(12, 0))
        .is_allowed());
}

#[test]
fn time_window_wrapping_midnight() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        time_restrictions: vec![TimeRestriction::new(1, 1)
            .with_window(time(22, 0), time(6, 0))
            .with_days(vec![1, 2, 3, 4, 5, 6, 7])],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);
    let req = get("/api/data", "1.2.3.4");

    assert!(enforcer.evaluate_at(&req, at(23, 30)).is_allowed());
    assert!(enforcer.evaluate_at(&req, at(5, 0)).is_allowed());
    expect_block(
        enforcer.evaluate_at(&req, at(7, 0)),
        BlockReason::TimeRestricted,
    );
}

#[test]
fn concurrent_limit_with_release() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        concurrent_limits: vec![ConcurrentLimit::new(1, 1, 2)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);
    let req = get("/api/data", "1.2.3.4");

    let first = enforcer.evaluate_at(&req, at(12, 0));
    let second = enforcer.evaluate_at(&req, at(12, 0));
    assert!(first.is_allowed());
    assert!(second.is_allowed());

    expect_block(
        enforcer.evaluate_at(&req, at(12, 0)),
        BlockReason::ConcurrentLimitExceeded,
    );

    // Completing one request frees a slot.
    drop(first);
    assert!(enforcer.evaluate_at(&req, at(12, 0)).is_allowed());
}

#[test]
fn parameterised_route_lookup() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/users/:id")],
        rules: vec![Rule::new(1, 1, 0)],
        ip_filters: vec![IpFilter::new(1, 1, "0.0.0.0/0", FilterKind::Blacklist)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    // The parameterised route is protected...
    expect_block(
        enforcer.evaluate_at(&get("/api/users/42", "1.2.3.4"), at(12, 0)),
        BlockReason::IpBlacklisted,
    );

    // ...but a longer path matches nothing and passes through.
    assert!(enforcer
        .evaluate_at(&get("/api/users/42/posts", "1.2.3.4"), at(12, 0))
        .is_allowed());
}

#[test]
fn custom_response_overrides_defaults() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        ip_filters: vec![IpFilter::new(1, 1, "1.2.3.4", FilterKind::Blacklist)],
        custom_responses: vec![
            CustomResponse::new(1, 1, 418, ResponseFormat::Plain).with_message("no"),
        ],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    let response = expect_block(
        enforcer.evaluate_at(&get("/api/data", "1.2.3.4"), at(12, 0)),
        BlockReason::IpBlacklisted,
    );
    assert_eq!(response.status.as_u16(), 418);
    assert_eq!(response.body, "no");
    assert_eq!(response.content_type, "text/plain");
}

#[test]
fn invalid_filter_data_fails_open() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        ip_filters: vec![IpFilter::new(1, 1, "not-an-ip", FilterKind::Blacklist)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    for ip in ["1.2.3.4", "10.0.0.1", "255.255.255.255"] {
        assert!(enforcer.evaluate_at(&get("/api/data", ip), at(12, 0)).is_allowed());
    }
}

#[test]
fn disabling_a_rule_is_equivalent_to_removing_it() {
    let blocked = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        ip_filters: vec![IpFilter::new(1, 1, "1.2.3.4", FilterKind::Blacklist)],
        ..Default::default()
    };
    let enforcer = enforcer_with(blocked.clone());
    assert!(!enforcer
        .evaluate_at(&get("/api/data", "1.2.3.4"), at(12, 0))
        .is_allowed());

    let mut disabled = blocked;
    disabled.rules = vec![Rule::new(1, 1, 0).with_enabled(false)];
    enforcer.reload(&StaticLoader::new(disabled)).unwrap();

    assert!(enforcer
        .evaluate_at(&get("/api/data", "1.2.3.4"), at(12, 0))
        .is_allowed());
}

#[test]
fn global_blacklist_expiry() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        blacklist: vec![BlacklistEntry::new(1, "5.5.5.5")
            .with_expiry(Utc.with_ymd_and_hms(2024, 6, 3, 13, 0, 0).unwrap())],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);
    let req = get("/api/data", "5.5.5.5");

    // Before expiry.
    expect_block(enforcer.evaluate_at(&req, at(12, 0)), BlockReason::IpBlacklisted);

    // After expiry the same snapshot admits the IP.
    assert!(enforcer.evaluate_at(&req, at(14, 0)).is_allowed());
}

#[test]
fn client_ip_from_forwarded_header() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        ip_filters: vec![IpFilter::new(1, 1, "203.0.113.9", FilterKind::Blacklist)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    let req = RequestInfo::new("GET", "/api/data")
        .with_header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
        .with_peer_addr("10.0.0.1");
    expect_block(enforcer.evaluate_at(&req, at(12, 0)), BlockReason::IpBlacklisted);

    let clean = RequestInfo::new("GET", "/api/data")
        .with_header("X-Forwarded-For", "203.0.113.10")
        .with_peer_addr("10.0.0.1");
    assert!(enforcer.evaluate_at(&clean, at(12, 0)).is_allowed());
}

#[test]
fn rate_limits_are_per_ip() {
    let data = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        rate_limits: vec![RateLimit::new(1, 1, 1, 60)],
        ..Default::default()
    };
    let enforcer = enforcer_with(data);

    assert!(enforcer.evaluate_at(&get("/api/data", "1.1.1.1"), at(12, 0)).is_allowed());
    assert!(!enforcer.evaluate_at(&get("/api/data", "1.1.1.1"), at(12, 0)).is_allowed());

    // An unrelated client is unaffected.
    assert!(enforcer.evaluate_at(&get("/api/data", "2.2.2.2"), at(12, 0)).is_allowed());
}

#[test]
fn snapshot_refresh_is_atomic_under_concurrent_traffic() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    // Two graphs that block the same IP by different means: A blacklists
    // it on rule 1, B whitelists only another IP on rule 2. Any coherent
    // snapshot blocks; only a torn mixture could admit the request.
    let graph_a = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(1, 1, 0)],
        ip_filters: vec![IpFilter::new(1, 1, "1.2.3.4", FilterKind::Blacklist)],
        ..Default::default()
    };
    let graph_b = SnapshotData {
        routes: vec![Route::new(1, "GET", "/api/data")],
        rules: vec![Rule::new(2, 1, 0)],
        ip_filters: vec![IpFilter::new(2, 2, "9.9.9.9", FilterKind::Whitelist)],
        ..Default::default()
    };

    let enforcer = Arc::new(Enforcer::new());
    enforcer.reload(&StaticLoader::new(graph_a.clone())).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = vec![];

    {
        let enforcer = Arc::clone(&enforcer);
        let stop = Arc::clone(&stop);
        handles.push(std::thread::spawn(move || {
            let loader_a = StaticLoader::new(graph_a);
            let loader_b = StaticLoader::new(graph_b);
            for i in 0..200 {
                if i % 2 == 0 {
                    enforcer.reload(&loader_b).unwrap();
                } else {
                    enforcer.reload(&loader_a).unwrap();
                }
            }
            stop.store(true, Ordering::Relaxed);
        }));
    }

    for _ in 0..4 {
        let enforcer = Arc::clone(&enforcer);
        let stop = Arc::clone(&stop);
        handles.push(std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let verdict = enforcer.evaluate_at(&get("/api/data", "1.2.3.4"), at(12, 0));
                assert!(!verdict.is_allowed(), "torn snapshot admitted a request");
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}
