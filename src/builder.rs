//! Bucket building.
//!
//! Groups classified rules into one [`RuleMatcher`] per anchor domain plus an
//! optional flat fallback matcher, counting what was added and skipped.

use std::collections::HashMap;

use log::debug;

use crate::classify::{classify, Classification};
use crate::rule::{Rule, RuleMatcher};
use crate::types::RefreshStats;

/// Result of one build pass
#[derive(Debug, Default)]
pub struct Buckets {
    /// One matcher per anchor domain
    pub by_domain: HashMap<String, RuleMatcher>,
    /// Matcher for rules not tied to a domain, when enabled
    pub fallback: Option<RuleMatcher>,
    pub stats: RefreshStats,
}

/// Accumulates rules for a single refresh cycle
#[derive(Debug)]
pub struct BucketBuilder {
    buckets: Buckets,
}

impl BucketBuilder {
    /// Create a builder. With `fallback` disabled, rules that are not
    /// domain-anchored are counted as skipped.
    pub fn new(fallback: bool) -> Self {
        Self {
            buckets: Buckets {
                by_domain: HashMap::with_capacity(1000),
                fallback: fallback.then(RuleMatcher::new),
                stats: RefreshStats::default(),
            },
        }
    }

    /// Classify a rule and add it to its bucket
    pub fn push(&mut self, rule: Rule) {
        match classify(rule) {
            Classification::Anchored { domain, rule } => {
                let matcher = self.buckets.by_domain.entry(domain).or_default();
                Self::insert(matcher, &rule, &mut self.buckets.stats);
            }
            Classification::Fallback(rule) => match self.buckets.fallback.as_mut() {
                Some(matcher) => Self::insert(matcher, &rule, &mut self.buckets.stats),
                None => self.buckets.stats.skipped += 1,
            },
            Classification::Skip(_) => self.buckets.stats.skipped += 1,
        }
    }

    fn insert(matcher: &mut RuleMatcher, rule: &Rule, stats: &mut RefreshStats) {
        match matcher.add_rule(rule) {
            Ok(()) => stats.added += 1,
            Err(e) => {
                debug!("Skipping rule {}: {}", rule.raw, e);
                stats.skipped += 1;
            }
        }
    }

    /// Finish the pass. Buckets whose every rule was rejected are dropped so
    /// they cannot shadow an ancestor domain's bucket.
    pub fn finish(mut self) -> Buckets {
        self.buckets.by_domain.retain(|_, m| !m.is_empty());
        if matches!(&self.buckets.fallback, Some(m) if m.is_empty()) {
            self.buckets.fallback = None;
        }

        let stats = &mut self.buckets.stats;
        stats.domains = self.buckets.by_domain.len();
        stats.fallback_rules = self.buckets.fallback.as_ref().map_or(0, RuleMatcher::len);
        self.buckets
    }
}

/// Build buckets from a rule stream in one pass
pub fn build_buckets(rules: impl IntoIterator<Item = Rule>, fallback: bool) -> Buckets {
    let mut builder = BucketBuilder::new(fallback);
    for rule in rules {
        builder.push(rule);
    }
    builder.finish()
}
