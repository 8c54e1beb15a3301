use std::borrow::Cow;

use regex::{Regex, RegexBuilder};

use super::{Rule, RuleOpts, RulePart};
use crate::error::{ListError, Result};
use crate::types::Request;

/// Compiled pattern of a single rule
#[derive(Debug)]
enum Pattern {
    Glob(Glob),
    Regex(Regex),
}

/// Where the first segment of a [`Glob`] has to match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    Url,
    Host,
}

/// Pattern split at wildcards into segments of literal text and separators.
///
/// Each segment is matched at its leftmost position after the previous one,
/// so a match costs at most the segment count times the URL length.
#[derive(Debug)]
struct Glob {
    start: Start,
    segments: Vec<Vec<RulePart>>,
    end_anchor: bool,
}

impl Glob {
    fn compile(parts: &[RulePart]) -> Self {
        let (start, floating, mut parts) = match parts.split_first() {
            Some((RulePart::StartAnchor, rest)) => (Start::Url, false, rest),
            Some((RulePart::DomainAnchor, rest)) => (Start::Host, false, rest),
            _ => (Start::Url, true, parts),
        };

        let end_anchor = matches!(parts.last(), Some(RulePart::EndAnchor));
        if end_anchor {
            parts = &parts[..parts.len() - 1];
        }

        let mut segments = Vec::new();
        if floating {
            // An unanchored pattern behaves as if it started with a wildcard
            segments.push(Vec::new());
        }
        segments.extend(
            parts
                .split(|p| *p == RulePart::Wildcard)
                .map(<[RulePart]>::to_vec),
        );

        Self {
            start,
            segments,
            end_anchor,
        }
    }

    fn matches(&self, url: &[u8]) -> bool {
        match self.start {
            Start::Url => self.match_from(url, 0),
            Start::Host => {
                let Some((start, end)) = host_range(url) else {
                    return false;
                };
                self.match_from(url, start)
                    || (start..end)
                        .filter(|&i| url[i] == b'.')
                        .any(|i| self.match_from(url, i + 1))
            }
        }
    }

    /// Match with the first segment pinned at `pos`
    fn match_from(&self, url: &[u8], pos: usize) -> bool {
        let Some((first, rest)) = self.segments.split_first() else {
            return false;
        };
        let Some(mut end) = segment_at(first, url, pos) else {
            return false;
        };

        for (i, segment) in rest.iter().enumerate() {
            if self.end_anchor && i + 1 == rest.len() {
                return (end..=url.len()).any(|p| segment_at(segment, url, p) == Some(url.len()));
            }
            match (end..=url.len()).find_map(|p| segment_at(segment, url, p)) {
                Some(e) => end = e,
                None => return false,
            }
        }

        !self.end_anchor || end == url.len()
    }
}

/// Match one wildcard-free segment at exactly `pos`, returning where it ends.
fn segment_at(segment: &[RulePart], url: &[u8], mut pos: usize) -> Option<usize> {
    for part in segment {
        match part {
            RulePart::Exact(text) => {
                let text = text.as_bytes();
                if !url[pos..].starts_with(text) {
                    return None;
                }
                pos += text.len();
            }
            // `^` also matches the end of the URL
            RulePart::Separator if pos == url.len() => {}
            RulePart::Separator if is_separator(url[pos]) => pos += 1,
            _ => return None,
        }
    }
    Some(pos)
}

#[derive(Debug)]
struct CompiledRule {
    pattern: Pattern,
    opts: RuleOpts,
}

impl CompiledRule {
    fn compile(rule: &Rule) -> Result<Self> {
        if let Some(option) = rule.opts.unsupported.first() {
            return Err(ListError::UnsupportedOption(option.clone()));
        }

        let pattern = match rule.parts.as_slice() {
            [] => return Err(ListError::InvalidRule(format!("Empty pattern: {}", rule.raw))),
            [RulePart::Regex(src)] => Pattern::Regex(
                RegexBuilder::new(src)
                    .case_insensitive(!rule.opts.match_case)
                    .build()?,
            ),
            parts if parts.iter().any(|p| matches!(p, RulePart::Regex(_))) => {
                return Err(ListError::InvalidRule(format!(
                    "Regex mixed with pattern parts: {}",
                    rule.raw
                )));
            }
            parts => Pattern::Glob(Glob::compile(parts)),
        };

        Ok(Self {
            pattern,
            opts: rule.opts.clone(),
        })
    }

    fn matches(&self, req: &Request, lower_url: &str) -> bool {
        if !self.options_match(req) {
            return false;
        }
        match &self.pattern {
            Pattern::Regex(re) => re.is_match(&req.url),
            Pattern::Glob(glob) => {
                let url = if self.opts.match_case {
                    req.url.as_str()
                } else {
                    lower_url
                };
                glob.matches(url.as_bytes())
            }
        }
    }

    fn options_match(&self, req: &Request) -> bool {
        let opts = &self.opts;

        if let Some(ty) = req.content_type {
            if !opts.types_include.is_empty() && !opts.types_include.contains(&ty) {
                return false;
            }
            if opts.types_exclude.contains(&ty) {
                return false;
            }
        }

        if let Some(want_third_party) = opts.third_party {
            match req.origin_domain.as_deref() {
                Some(origin) => {
                    if is_third_party(&req.domain, origin) != want_third_party {
                        return false;
                    }
                }
                // Party cannot be decided without an origin
                None => return false,
            }
        }

        if !opts.domains_include.is_empty() || !opts.domains_exclude.is_empty() {
            let origin = req.origin_domain.as_deref();
            if let Some(origin) = origin {
                if opts.domains_exclude.iter().any(|d| is_subdomain_of(origin, d)) {
                    return false;
                }
            }
            if !opts.domains_include.is_empty() {
                return match origin {
                    Some(origin) => opts.domains_include.iter().any(|d| is_subdomain_of(origin, d)),
                    None => false,
                };
            }
        }

        true
    }
}

/// Compiled set of block and exception rules.
///
/// A request is matched when at least one blocking rule applies and no
/// exception rule does. Rules keep the order they were added in.
#[derive(Debug, Default)]
pub struct RuleMatcher {
    blocks: Vec<CompiledRule>,
    exceptions: Vec<CompiledRule>,
}

impl RuleMatcher {
    /// Create an empty matcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and add a rule. On error the matcher is left unchanged.
    pub fn add_rule(&mut self, rule: &Rule) -> Result<()> {
        let compiled = CompiledRule::compile(rule)?;
        if rule.exception {
            self.exceptions.push(compiled);
        } else {
            self.blocks.push(compiled);
        }
        Ok(())
    }

    /// Check whether the request is blocked by this rule set
    pub fn matches(&self, req: &Request) -> bool {
        self.block_matches(req) && !self.exception_matches(req)
    }

    /// Check whether any blocking rule applies, ignoring exceptions
    pub fn block_matches(&self, req: &Request) -> bool {
        let lower_url = lowercase_url(req);
        self.blocks.iter().any(|r| r.matches(req, &lower_url))
    }

    /// Check whether any exception rule applies
    pub fn exception_matches(&self, req: &Request) -> bool {
        let lower_url = lowercase_url(req);
        self.exceptions.iter().any(|r| r.matches(req, &lower_url))
    }

    /// Number of rules (block and exception)
    pub fn len(&self) -> usize {
        self.blocks.len() + self.exceptions.len()
    }

    /// Check if the matcher holds no rules
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty() && self.exceptions.is_empty()
    }
}

fn lowercase_url(req: &Request) -> Cow<'_, str> {
    if req.url.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(req.url.to_ascii_lowercase())
    } else {
        Cow::Borrowed(req.url.as_str())
    }
}

/// `domain` equals `parent` or is one of its subdomains
fn is_subdomain_of(domain: &str, parent: &str) -> bool {
    domain == parent
        || (domain.len() > parent.len()
            && domain.ends_with(parent)
            && domain.as_bytes()[domain.len() - parent.len() - 1] == b'.')
}

/// Without a public suffix list, two hosts are treated as the same party when
/// one is the other or a subdomain of it.
fn is_third_party(domain: &str, origin: &str) -> bool {
    !(is_subdomain_of(domain, origin) || is_subdomain_of(origin, domain))
}

/// `^` matches anything but a letter, a digit, or one of `_-.%`
fn is_separator(b: u8) -> bool {
    !(b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'%'))
}

/// Byte range of the host inside `scheme://[userinfo@]host[:port]/...`
fn host_range(url: &[u8]) -> Option<(usize, usize)> {
    let scheme_end = url.windows(3).position(|w| w == b"://")? + 3;
    let authority_end = url[scheme_end..]
        .iter()
        .position(|&b| matches!(b, b'/' | b'?' | b'#'))
        .map_or(url.len(), |p| scheme_end + p);
    let start = url[scheme_end..authority_end]
        .iter()
        .rposition(|&b| b == b'@')
        .map_or(scheme_end, |p| scheme_end + p + 1);
    Some((start, authority_end))
}
