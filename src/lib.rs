//! easylist-r - EasyList request blocking for proxies and gateways
//!
//! This library answers one question per request: is it permitted by a
//! block list such as EasyList? It provides:
//! - Adblock-Plus rule parsing (`||domain^`, `|`, `*`, `^`, `/regex/`, `$options`)
//! - One compiled matcher per anchor domain, indexed by reversed domain keys
//!   for longest-ancestor lookup
//! - A flat fallback matcher for rules not tied to a domain
//! - Lock-light hot swapping of the whole rule set
//! - Download, local caching and periodic refresh of the list
//!
//! # Example
//!
//! ```rust
//! use easylist_r::{List, Request};
//!
//! let rules = "
//! [Adblock Plus 2.0]
//! ||doubleclick.net^
//! ||s3.amazonaws.com^$domain=gaybeeg.info
//! /adwords/
//! ";
//!
//! let list = List::new();
//!
//! // Nothing loaded yet: everything is allowed
//! assert!(list.allow_url("https://googleads.g.doubleclick.net/"));
//!
//! list.refresh(rules.as_bytes()).unwrap();
//!
//! assert!(!list.allow_url("https://googleads.g.doubleclick.net/"));
//! assert!(!list.allow_url("http://somedomain.com/adwords/stuff"));
//! assert!(list.allow_url("http://osnews.com/"));
//!
//! let req = Request::from_parts("s3.amazonaws.com", "https://s3.amazonaws.com/", Some("https://gaybeeg.info"));
//! assert!(!list.allow(&req));
//! ```
//!
//! # Keeping the list up to date
//!
//! ```no_run
//! use std::time::Duration;
//!
//! let list = easylist_r::open("easylist.txt", Duration::from_secs(300)).unwrap();
//! assert!(list.allow_url("http://osnews.com/"));
//! ```
//!
//! # Rule handling
//!
//! | Rule | Handling |
//! |------|----------|
//! | `\|\|example.com^` | Indexed under `example.com` |
//! | `\|\|example.com/ads/` | Indexed under `example.com` |
//! | `/adwords/` | Fallback matcher |
//! | `\|\|ads.*/x` | Fallback matcher (open-ended domain) |
//! | `...$subdocument`, `$xmlhttprequest`, `$object-subrequest`, `$other`, `$popup`, `$document` | Dropped |
//! | `...$csp=...` and other unknown options | Rejected by the matcher, counted as skipped |
//! | `example.com##.banner` | Ignored (element hiding) |

pub mod builder;
pub mod cache;
pub mod classify;
pub mod error;
pub mod index;
pub mod list;
pub mod rule;
pub mod types;

// Re-export commonly used items
pub use builder::{build_buckets, BucketBuilder, Buckets};
pub use cache::{UrlCache, UrlCacheBuilder, DEFAULT_CHECK_INTERVAL, DEFAULT_FETCH_TIMEOUT};
pub use classify::{classify, Classification, SkipReason};
pub use error::{FetchErrorKind, ListError, Result};
pub use index::DomainIndex;
pub use list::{open, open_with_options, AllowChecker, List, ListOptions, OpenList, DEFAULT_LIST_URL};
pub use rule::{parse_rule, parse_rules, ParsedList, Rule, RuleMatcher, RuleOpts, RulePart};
pub use types::{ContentType, RefreshStats, Request};
