use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use footy_value::api_cache::{ApiCache, CacheHit};

fn temp_cache(name: &str) -> (ApiCache, PathBuf) {
    let dir = std::env::temp_dir().join(format!("footy_value_cache_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    (ApiCache::new(&dir), dir)
}

#[test]
fn repeated_reads_inside_window_are_identical() {
    let (cache, dir) = temp_cache("window");
    let calls = Cell::new(0);
    let fetch = || {
        calls.set(calls.get() + 1);
        Ok(format!("{{\"call\":{}}}", calls.get()))
    };
    let params = [("season_id", "9660"), ("include", "stats")];
    let hour = Duration::from_secs(3600);

    let (first, hit) = cache.get_or_fetch("league-teams", &params, hour, fetch).unwrap();
    assert_eq!(hit, CacheHit::Fetched);
    for _ in 0..3 {
        let (again, hit) = cache
            .get_or_fetch("league-teams", &params, hour, || Ok("different".to_string()))
            .unwrap();
        assert_eq!(hit, CacheHit::Fresh);
        assert_eq!(again, first);
    }
    assert_eq!(calls.get(), 1);

    // Parameter order does not change the key.
    let swapped = [("include", "stats"), ("season_id", "9660")];
    assert_eq!(cache.get("league-teams", &swapped, hour), Some(first));
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn expired_entries_refetch_and_fall_back_when_offline() {
    let (cache, dir) = temp_cache("expired");
    let old = SystemTime::now() - Duration::from_secs(7200);
    cache.store_at("teams", &[("league", "39")], "old body", old).unwrap();
    let hour = Duration::from_secs(3600);
    assert_eq!(cache.get("teams", &[("league", "39")], hour), None);

    let (body, hit) = cache
        .get_or_fetch("teams", &[("league", "39")], hour, || {
            Err(anyhow::anyhow!("network down"))
        })
        .unwrap();
    assert_eq!(hit, CacheHit::Stale);
    assert_eq!(body, "old body");

    let (body, hit) = cache
        .get_or_fetch("teams", &[("league", "39")], hour, || Ok("new body".to_string()))
        .unwrap();
    assert_eq!(hit, CacheHit::Fetched);
    assert_eq!(body, "new body");
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn api_keys_do_not_split_the_cache() {
    let (cache, dir) = temp_cache("keys");
    let a = cache.entry_path("league-list", &[("key", "first"), ("chosen_leagues_only", "true")]);
    let b = cache.entry_path("league-list", &[("key", "second"), ("chosen_leagues_only", "true")]);
    assert_eq!(a, b);
    let _ = fs::remove_dir_all(dir);
}

#[test]
fn missing_entry_without_network_is_an_error() {
    let (cache, dir) = temp_cache("miss");
    let res = cache.get_or_fetch("teams", &[], Duration::from_secs(60), || {
        Err(anyhow::anyhow!("offline"))
    });
    assert!(res.is_err());
    let _ = fs::remove_dir_all(dir);
}
