//! Rule classification.
//!
//! Decides whether a parsed rule can be indexed under an anchor domain, has
//! to go to the flat fallback matcher, or must be dropped.

use log::debug;
use url::Url;

use crate::rule::{Rule, RulePart};
use crate::types::ContentType;

/// Content types that can only be known inside a browser. Rules naming them
/// are dropped instead of being evaluated without that context.
const BROWSER_ONLY_TYPES: [ContentType; 6] = [
    ContentType::ObjectSubrequest,
    ContentType::Subdocument,
    ContentType::XmlHttpRequest,
    ContentType::Other,
    ContentType::Popup,
    ContentType::Document,
];

/// Why a rule was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Anchor text is not a valid host
    InvalidHost,
    /// Rule depends on browser-only request context
    BrowserOnlyOption,
}

/// Outcome of classifying one rule
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Rule applies to `domain` and its subdomains
    Anchored { domain: String, rule: Rule },
    /// Rule is not tied to a single domain
    Fallback(Rule),
    Skip(SkipReason),
}

/// Classify a parsed rule.
pub fn classify(mut rule: Rule) -> Classification {
    if BROWSER_ONLY_TYPES.iter().any(|&ty| rule.opts.references(ty)) {
        debug!("Skipping rule with unsupported option: {}", rule.raw);
        return Classification::Skip(SkipReason::BrowserOnlyOption);
    }

    let text = match rule.parts.as_slice() {
        [RulePart::DomainAnchor, RulePart::Exact(text), ..] => text.clone(),
        _ => return Classification::Fallback(rule),
    };

    let host = match Url::parse(&format!("http://{}", text)) {
        Ok(url) => match url.host_str() {
            Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
            _ => {
                debug!("Unable to parse {}: no host", text);
                return Classification::Skip(SkipReason::InvalidHost);
            }
        },
        Err(e) => {
            debug!("Unable to parse {}: {}", text, e);
            return Classification::Skip(SkipReason::InvalidHost);
        }
    };

    if !ends_on_label_boundary(&rule.parts, &text) || host.split('.').any(str::is_empty) {
        // e.g. `||ads.` or `||ad*.example.com`: the domain is open-ended
        return Classification::Fallback(rule);
    }

    if !text.is_ascii() {
        // Requests carry the punycode form of internationalized hosts
        let host_end = text.find(['/', ':', '?', '#']).unwrap_or(text.len());
        rule.parts[1] = RulePart::Exact(format!("{}{}", host, &text[host_end..]));
    }

    Classification::Anchored { domain: host, rule }
}

/// The anchor text names a complete host: it is followed by a port, path or
/// query, or the next pattern part cannot extend the last label.
fn ends_on_label_boundary(parts: &[RulePart], text: &str) -> bool {
    if text.contains(['/', ':', '?', '#']) {
        return true;
    }
    matches!(
        parts.get(2),
        None | Some(RulePart::Separator) | Some(RulePart::EndAnchor)
    )
}
