//! Integration tests for List against an EasyList excerpt in testdata/

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use easylist_r::{List, RefreshStats, Request};

fn testdata_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("testdata");
    path.push(filename);
    path
}

fn load_easylist() -> List {
    let list = List::new();
    let file = fs::File::open(testdata_path("easylist.txt")).expect("testdata/easylist.txt");
    list.refresh(file).expect("easylist excerpt should load");
    list
}

/// (host, path, origin) -> expected allow
fn scenarios() -> Vec<(&'static str, &'static str, Option<&'static str>, bool)> {
    vec![
        ("osnews.com", "/", None, true),
        ("somedomain.com", "/adwords/stuff", None, false),
        ("googleads.g.doubleclick.net", "/", None, false),
        ("c-sharpcorner.com", "/something/allowed", None, true),
        ("c-sharpcorner.com", "/stuff/banners/", None, false),
        ("s3.amazonaws.com", "/", Some("https://gaybeeg.info"), false),
        ("s3.amazonaws.com", "/", None, true),
    ]
}

fn request(host: &str, path: &str, origin: Option<&str>) -> Request {
    Request::from_parts(host, format!("http://{}{}", host, path), origin)
}

#[test]
fn test_easylist_scenarios() {
    let list = load_easylist();

    for (host, path, origin, expected) in scenarios() {
        assert_eq!(
            list.allow(&request(host, path, origin)),
            expected,
            "{}{} (origin {:?}) should be {}",
            host,
            path,
            origin,
            if expected { "allowed" } else { "blocked" }
        );
    }
}

#[test]
fn test_easylist_stats() {
    let list = load_easylist();
    assert_eq!(
        list.stats(),
        Some(RefreshStats {
            added: 20,
            skipped: 6,
            domains: 9,
            fallback_rules: 8,
        })
    );
}

#[test]
fn test_everything_allowed_before_first_load() {
    let list = List::new();
    for (host, path, origin, _) in scenarios() {
        assert!(
            list.allow(&request(host, path, origin)),
            "{}{} should be allowed before any rules are loaded",
            host,
            path
        );
    }
}

#[test]
fn test_unlisted_domains_allowed_regardless_of_path() {
    let list = load_easylist();
    for path in ["/", "/index.html", "/news/today?id=1", "/images/logo.png"] {
        assert!(list.allow(&request("osnews.com", path, None)), "osnews.com{}", path);
        assert!(list.allow(&request("rust-lang.org", path, None)), "rust-lang.org{}", path);
    }
}

#[test]
fn test_exceptions_in_bucket() {
    let list = load_easylist();
    assert!(!list.allow(&request("ads.yahoo.com", "/banner.js", None)));
    assert!(list.allow(&request("ads.yahoo.com", "/static/fonts/a.woff", None)));
    assert!(list.allow(&request("doubleclick.net", "/instream/ad_status.js", None)));
}

#[test]
fn test_browser_only_rules_are_dropped() {
    let list = load_easylist();
    assert!(list.allow(&request("video.example.com", "/", None)));
    assert!(list.allow(&request("api.example.com", "/track", None)));
    assert!(list.allow(&request("static.example.com", "/beacon", None)));
    assert!(list.allow(&request("widgets.example.com", "/", Some("https://news.site"))));
    assert!(list.allow(&request("popups.example.com", "/", None)));
    assert!(list.allow(&request("popups.example.com", "/window.html", Some("https://news.site"))));
}

#[test]
fn test_bucket_exception_overrides_generic_block() {
    let list = List::new();
    list.refresh("/adwords/\n@@||example.com/adwords/\n".as_bytes())
        .unwrap();

    assert!(list.allow(&request("example.com", "/adwords/x", None)));
    assert!(list.allow(&request("www.example.com", "/adwords/x", None)));
    assert!(!list.allow(&request("somedomain.com", "/adwords/x", None)));
}

#[test]
fn test_generic_exception_overrides_bucket_block() {
    let list = List::new();
    list.refresh("||example.com^\n@@/public/logo.png\n".as_bytes())
        .unwrap();

    assert!(!list.allow(&request("example.com", "/ads/x", None)));
    assert!(list.allow(&request("example.com", "/public/logo.png", None)));
    assert!(list.allow(&request("cdn.example.com", "/public/logo.png", None)));
}

#[test]
fn test_exceptions_without_block_change_nothing() {
    let list = List::new();
    list.refresh("@@||example.com^\n@@/adwords/\n||doubleclick.net^\n".as_bytes())
        .unwrap();

    assert!(list.allow(&request("example.com", "/", None)));
    assert!(!list.allow(&request("doubleclick.net", "/", None)));
    assert!(list.allow(&request("doubleclick.net", "/adwords/", None)));
}

#[test]
fn test_multi_wildcard_rules_on_long_urls() {
    let list = List::new();
    list.refresh("-*-*-*-*-x\n||example.com^*-*-*-*-y|\n".as_bytes())
        .unwrap();

    let padding = "-".repeat(20_000);
    let started = Instant::now();
    assert!(list.allow(&request("osnews.com", &format!("/{}", padding), None)));
    assert!(list.allow(&request("www.example.com", &format!("/{}", padding), None)));
    assert!(!list.allow(&request("osnews.com", &format!("/{}x", padding), None)));
    assert!(!list.allow(&request("www.example.com", &format!("/{}y", padding), None)));
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "allow took {:?}",
        started.elapsed()
    );
}

#[test]
fn test_struct_literal_request_is_normalized() {
    let list = List::new();
    list.refresh("||tracker.net^$third-party\n/pixel.gif$third-party\n".as_bytes())
        .unwrap();

    let req = Request {
        url: "http://Tracker.NET:8080/pixel.gif".to_string(),
        domain: "Tracker.NET:8080".to_string(),
        origin_domain: Some("WWW.Tracker.net".to_string()),
        content_type: None,
    };
    // First-party once both hosts are normalized
    assert!(list.allow(&req));

    let third = Request {
        origin_domain: Some("News.COM".to_string()),
        ..req
    };
    assert!(!list.allow(&third));
}

#[test]
fn test_idn_host_resolves_to_bucket() {
    let list = List::new();
    list.refresh("||bücher.example^\n".as_bytes()).unwrap();

    let req = Request::from_parts("BÜCHER.example", "http://xn--bcher-kva.example/", None);
    assert!(!list.allow(&req));
    assert!(!list.allow_url("http://bücher.example/ads"));
    assert!(list.allow_url("http://example.com/"));
}

#[test]
fn test_longest_prefix_resolution() {
    let list = List::new();
    list.refresh("||example.com/tracking/\n||ads.example.com/banner/\n".as_bytes())
        .unwrap();

    // ads.example.com resolves to its own bucket
    assert!(!list.allow(&request("ads.example.com", "/banner/x", None)));
    assert!(list.allow(&request("ads.example.com", "/tracking/x", None)));
    assert!(!list.allow(&request("sub.ads.example.com", "/banner/x", None)));

    // Other subdomains fall back to the example.com bucket
    assert!(!list.allow(&request("www.example.com", "/tracking/x", None)));
    assert!(list.allow(&request("www.example.com", "/banner/x", None)));
}

#[test]
fn test_label_boundary() {
    let list = List::new();
    list.refresh("||example.com^\n".as_bytes()).unwrap();

    assert!(!list.allow(&request("example.com", "/", None)));
    assert!(!list.allow(&request("www.example.com", "/", None)));
    assert!(list.allow(&request("notexample.com", "/", None)));
    assert!(list.allow(&request("evil-example.com", "/", None)));
    assert!(list.allow(&request("example.com.evil.org", "/", None)));
}

#[test]
fn test_host_with_port() {
    let list = load_easylist();
    let req = Request::from_parts(
        "googleads.g.doubleclick.net:443",
        "https://googleads.g.doubleclick.net:443/pagead",
        None,
    );
    assert!(!list.allow(&req));
}

#[test]
fn test_republishing_same_content_is_idempotent() {
    let list = load_easylist();
    let probes: Vec<Request> = scenarios()
        .into_iter()
        .map(|(h, p, o, _)| request(h, p, o))
        .chain([
            request("ads.yahoo.com", "/static/fonts/a.woff", None),
            request("cdn.example.com", "/player/ads.js", None),
            request("adserver1.example.net", "/", None),
        ])
        .collect();

    let before: Vec<bool> = probes.iter().map(|r| list.allow(r)).collect();
    let stats_before = list.stats();

    let file = fs::File::open(testdata_path("easylist.txt")).unwrap();
    list.refresh(file).unwrap();

    let after: Vec<bool> = probes.iter().map(|r| list.allow(r)).collect();
    assert_eq!(before, after);
    assert_eq!(stats_before, list.stats());
}

#[test]
fn test_malformed_refresh_keeps_results() {
    let list = load_easylist();
    let probes: Vec<Request> = scenarios()
        .into_iter()
        .map(|(h, p, o, _)| request(h, p, o))
        .collect();
    let before: Vec<bool> = probes.iter().map(|r| list.allow(r)).collect();

    let html = "<!DOCTYPE html>\n<html><head><title>Login</title></head></html>\n";
    assert!(list.refresh(html.as_bytes()).is_err());
    let binary: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
    assert!(list.refresh(binary).is_err());
    assert!(list.refresh("".as_bytes()).is_err());

    let after: Vec<bool> = probes.iter().map(|r| list.allow(r)).collect();
    assert_eq!(before, after);
}

#[test]
fn test_concurrent_reads_during_refresh() {
    const LIST_A: &str = "||doubleclick.net^\n||example.com/a/\n";
    const LIST_B: &str = "||doubleclick.net^\n||example.com/b/\n/adwords/\n";

    let list = Arc::new(List::new());
    list.refresh(LIST_A.as_bytes()).unwrap();

    thread::scope(|s| {
        for _ in 0..4 {
            let list = Arc::clone(&list);
            s.spawn(move || {
                let blocked = request("googleads.g.doubleclick.net", "/", None);
                let allowed = request("osnews.com", "/", None);
                for _ in 0..2000 {
                    // Every published snapshot blocks one and allows the other
                    assert!(!list.allow(&blocked));
                    assert!(list.allow(&allowed));
                }
            });
        }

        let writer = Arc::clone(&list);
        s.spawn(move || {
            for i in 0..50 {
                let text = if i % 2 == 0 { LIST_B } else { LIST_A };
                writer.refresh(text.as_bytes()).unwrap();
            }
        });
    });

    // Last write was LIST_A
    assert!(list.allow(&request("example.com", "/b/x", None)));
    assert!(!list.allow(&request("example.com", "/a/x", None)));
}
