//! Block-list rules.
//!
//! `parser` turns an Adblock-Plus style document into [`Rule`] records and
//! `matcher` compiles rules into a [`RuleMatcher`] that decides whether a
//! request is blocked.

mod matcher;
mod parser;

pub use matcher::RuleMatcher;
pub use parser::{parse_rule, parse_rules, ParsedList};

use crate::types::ContentType;

/// One structural element of a rule pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePart {
    /// `||` - the following text must start at a host label boundary
    DomainAnchor,
    /// `|` at the start - the pattern must match at the beginning of the URL
    StartAnchor,
    /// `|` at the end - the pattern must match at the end of the URL
    EndAnchor,
    /// `*` - any sequence of characters
    Wildcard,
    /// `^` - a separator character or the end of the URL
    Separator,
    /// Literal text
    Exact(String),
    /// `/regex/` rule body
    Regex(String),
}

/// Options listed after `$`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOpts {
    /// `third-party` (Some(true)) or `~third-party` (Some(false))
    pub third_party: Option<bool>,
    /// Content types the rule is restricted to
    pub types_include: Vec<ContentType>,
    /// Content types the rule never applies to
    pub types_exclude: Vec<ContentType>,
    /// `domain=` origins the rule is restricted to
    pub domains_include: Vec<String>,
    /// `domain=~...` origins the rule never applies to
    pub domains_exclude: Vec<String>,
    /// `match-case`
    pub match_case: bool,
    /// Options this crate does not understand
    pub unsupported: Vec<String>,
}

impl RuleOpts {
    /// Whether the rule mentions a content type, either positively or negated.
    pub fn references(&self, ty: ContentType) -> bool {
        self.types_include.contains(&ty) || self.types_exclude.contains(&ty)
    }
}

/// A parsed block-list rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Original rule text
    pub raw: String,
    /// `@@` exception rule
    pub exception: bool,
    pub parts: Vec<RulePart>,
    pub opts: RuleOpts,
}
