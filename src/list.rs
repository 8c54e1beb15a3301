//! Published block list.
//!
//! [`List`] owns the currently published snapshot (domain index plus the
//! optional fallback matcher). Refreshes build a new snapshot privately and
//! swap it in under a write lock held only for the pointer store; allow checks
//! clone the snapshot `Arc` under a read lock and evaluate without it.

use std::borrow::Cow;
use std::io::Read;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{info, trace};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::builder::build_buckets;
use crate::cache::{UrlCache, DEFAULT_CHECK_INTERVAL, DEFAULT_FETCH_TIMEOUT};
use crate::error::Result;
use crate::index::DomainIndex;
use crate::rule::{parse_rules, RuleMatcher};
use crate::types::{normalize_host, RefreshStats, Request};

/// EasyList, the default block list
pub const DEFAULT_LIST_URL: &str = "https://easylist.to/easylist/easylist.txt";

/// Anything that can decide whether a request may proceed
pub trait AllowChecker: Send + Sync {
    /// Check whether the request is allowed
    fn allow(&self, req: &Request) -> bool;
}

/// Immutable rule set published by one refresh
#[derive(Debug)]
struct Snapshot {
    index: DomainIndex,
    fallback: Option<RuleMatcher>,
    stats: RefreshStats,
}

/// Block list with hot-swappable rules.
///
/// Until the first successful [`refresh`](List::refresh) every request is
/// allowed.
#[derive(Debug)]
pub struct List {
    published: RwLock<Option<Arc<Snapshot>>>,
    fallback: bool,
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl List {
    /// Create an empty list with the fallback matcher enabled
    pub fn new() -> Self {
        Self::with_fallback(true)
    }

    /// Create an empty list. `fallback` controls whether rules that are not
    /// anchored to a domain are evaluated.
    pub fn with_fallback(fallback: bool) -> Self {
        Self {
            published: RwLock::new(None),
            fallback,
        }
    }

    /// Rebuild the rule set from a block-list document and publish it.
    ///
    /// On error nothing is published and the previous rule set stays in
    /// effect.
    pub fn refresh(&self, reader: impl Read) -> Result<RefreshStats> {
        let parsed = parse_rules(reader)?;
        let invalid = parsed.invalid;

        let buckets = build_buckets(parsed.rules, self.fallback);
        let mut stats = buckets.stats;
        stats.skipped += invalid;

        let snapshot = Arc::new(Snapshot {
            index: DomainIndex::from(buckets.by_domain),
            fallback: buckets.fallback,
            stats,
        });

        let previous = std::mem::replace(&mut *self.published.write(), Some(snapshot));
        // The old snapshot is freed here, outside the lock, unless a reader
        // still holds it
        drop(previous);

        info!(
            "Loaded new ruleset, added: {}   skipped: {}   domains: {}",
            stats.added, stats.skipped, stats.domains
        );
        Ok(stats)
    }

    /// Check whether the request is allowed. Never blocks on a refresh.
    ///
    /// The domain's bucket and the fallback matcher are evaluated as one rule
    /// set: the request is blocked when a blocking rule in either applies and
    /// no exception rule in either does.
    pub fn allow(&self, req: &Request) -> bool {
        let Some(snapshot) = self.snapshot() else {
            // Until we've been initialized, allow everything
            return true;
        };

        let req = normalized(req);
        let bucket = snapshot.index.lookup_entry(&req.domain);
        let matchers = || {
            bucket
                .map(|(_, bucket)| bucket)
                .into_iter()
                .chain(snapshot.fallback.as_ref())
        };

        if !matchers().any(|m| m.block_matches(&req)) {
            return true;
        }
        if matchers().any(|m| m.exception_matches(&req)) {
            trace!("Allowed {} by exception", req.url);
            return true;
        }

        match bucket {
            Some((anchor, _)) => trace!("Blocked {} (rules for {})", req.url, anchor),
            None => trace!("Blocked {} by generic rules", req.url),
        }
        false
    }

    /// Check a URL without headers. Unparsable URLs are allowed.
    pub fn allow_url(&self, url: &str) -> bool {
        match Request::new(url) {
            Ok(req) => self.allow(&req),
            Err(_) => true,
        }
    }

    /// Whether a rule set has been published
    pub fn is_loaded(&self) -> bool {
        self.published.read().is_some()
    }

    /// Counters of the published rule set
    pub fn stats(&self) -> Option<RefreshStats> {
        self.snapshot().map(|s| s.stats)
    }

    fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.published.read().clone()
    }
}

/// Request constructors normalize hosts; struct literals may not
fn normalized(req: &Request) -> Cow<'_, Request> {
    let origin_ok = req.origin_domain.as_deref().map_or(true, is_normalized);
    if is_normalized(&req.domain) && origin_ok {
        return Cow::Borrowed(req);
    }
    Cow::Owned(Request {
        domain: normalize_host(&req.domain),
        origin_domain: req.origin_domain.as_deref().map(normalize_host),
        ..req.clone()
    })
}

fn is_normalized(host: &str) -> bool {
    !host.ends_with('.')
        && host
            .bytes()
            .all(|b| b.is_ascii() && !b.is_ascii_uppercase() && b != b':' && b != b'[' && b != b' ')
}

impl AllowChecker for List {
    fn allow(&self, req: &Request) -> bool {
        List::allow(self, req)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

/// Options for [`open_with_options`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListOptions {
    /// Block-list URL
    pub url: String,
    /// Local copy of the list
    pub cache_file: PathBuf,
    /// Interval between refreshes, in seconds when serialized
    #[serde(with = "duration_secs")]
    pub check_interval: Duration,
    /// Download timeout, in seconds when serialized
    #[serde(with = "duration_secs")]
    pub fetch_timeout: Duration,
    /// Evaluate rules that are not anchored to a domain
    pub fallback: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_LIST_URL.to_string(),
            cache_file: PathBuf::from("easylist.txt"),
            check_interval: DEFAULT_CHECK_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fallback: true,
        }
    }
}

impl ListOptions {
    /// Create options caching the default list at `cache_file`
    pub fn new(cache_file: impl AsRef<Path>) -> Self {
        Self {
            cache_file: cache_file.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Set the list URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the refresh interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Set the download timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Enable or disable the fallback matcher
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }
}

/// A [`List`] kept up to date from a remote URL.
///
/// Dereferences to the list. Dropping it stops the background refresh.
pub struct OpenList {
    list: Arc<List>,
    _cache: UrlCache,
}

impl OpenList {
    /// Shared handle to the list, e.g. for request-handling threads
    pub fn list(&self) -> Arc<List> {
        Arc::clone(&self.list)
    }
}

impl Deref for OpenList {
    type Target = List;

    fn deref(&self) -> &List {
        &self.list
    }
}

impl AllowChecker for OpenList {
    fn allow(&self, req: &Request) -> bool {
        self.list.allow(req)
    }
}

/// Open the default block list, caching it at `cache_file` and checking for
/// updates every `check_interval`.
pub fn open(cache_file: impl AsRef<Path>, check_interval: Duration) -> Result<OpenList> {
    open_with_options(ListOptions::new(cache_file).with_check_interval(check_interval))
}

/// Open a block list with explicit options
pub fn open_with_options(options: ListOptions) -> Result<OpenList> {
    let list = Arc::new(List::with_fallback(options.fallback));

    let target = Arc::clone(&list);
    let cache = UrlCache::builder(options.url, &options.cache_file)
        .with_check_interval(options.check_interval)
        .with_fetch_timeout(options.fetch_timeout)
        .open(move |reader| target.refresh(reader).map(|_| ()))?;

    Ok(OpenList {
        list,
        _cache: cache,
    })
}
