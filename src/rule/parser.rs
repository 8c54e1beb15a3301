use std::io::{BufRead, BufReader, Read};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Rule, RuleOpts, RulePart};
use crate::error::{ListError, Result};
use crate::types::ContentType;

/// Regex pattern for a single option token
/// Format: [~]name[=value]
static OPTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(~?)([a-z0-9_-]+)(?:=(.*))?$")
        .expect("OPTION_PATTERN: hardcoded regex is invalid")
});

/// Element hiding markers; such lines carry no request rules.
const COSMETIC_MARKERS: [&str; 5] = ["##", "#@#", "#?#", "#$#", "#@?#"];

/// Rules parsed from one document
#[derive(Debug, Clone, Default)]
pub struct ParsedList {
    /// Request rules in document order
    pub rules: Vec<Rule>,
    /// Lines that looked like rules but could not be parsed
    pub invalid: usize,
}

/// Parse a block-list document.
///
/// Fails only when the document as a whole is unusable (read error, invalid
/// UTF-8, binary or HTML content, no rules at all). Malformed single lines are
/// counted in [`ParsedList::invalid`] and skipped.
pub fn parse_rules(reader: impl Read) -> Result<ParsedList> {
    let mut reader = BufReader::new(reader);
    let mut parsed = ParsedList::default();
    let mut buf = Vec::new();
    let mut line_num = 0;
    let mut seen_content = false;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_num += 1;

        if buf.contains(&0) {
            return Err(ListError::ParseErrorAtLine {
                line: line_num,
                message: "NUL byte in document".to_string(),
            });
        }
        let line = std::str::from_utf8(&buf).map_err(|e| ListError::ParseErrorAtLine {
            line: line_num,
            message: format!("Invalid UTF-8: {}", e),
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if !seen_content {
            seen_content = true;
            if line.starts_with('<') {
                return Err(ListError::InvalidDocument(
                    "Document looks like HTML, not a block list".to_string(),
                ));
            }
        }

        match parse_rule(line) {
            Ok(Some(rule)) => parsed.rules.push(rule),
            Ok(None) => {}
            Err(e) => {
                debug!("Skipping line {}: {}", line_num, e);
                parsed.invalid += 1;
            }
        }
    }

    if !seen_content {
        return Err(ListError::InvalidDocument("Document is empty".to_string()));
    }

    Ok(parsed)
}

/// Parse a single rule line.
///
/// Returns `Ok(None)` for lines that carry no request rule: comments, the
/// `[Adblock Plus]` header and element hiding rules.
pub fn parse_rule(line: &str) -> Result<Option<Rule>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('!') || line.starts_with('[') {
        return Ok(None);
    }
    if COSMETIC_MARKERS.iter().any(|m| line.contains(m)) {
        return Ok(None);
    }

    let (exception, body) = match line.strip_prefix("@@") {
        Some(rest) => (true, rest),
        None => (false, line),
    };

    let (pattern, opts) = match split_options(body) {
        (pattern, Some(options)) => (pattern, parse_options(options)?),
        (pattern, None) => (pattern, RuleOpts::default()),
    };

    let parts = parse_pattern(pattern, opts.match_case);
    if parts.is_empty() {
        return Err(ListError::InvalidRule(format!("Empty pattern: {}", line)));
    }

    Ok(Some(Rule {
        raw: line.to_string(),
        exception,
        parts,
        opts,
    }))
}

/// Split `pattern$options`. A `$` followed by text containing `/` belongs to
/// the pattern (e.g. a regex rule ending in `$/`).
fn split_options(body: &str) -> (&str, Option<&str>) {
    match body.rfind('$') {
        Some(pos) if !body[pos + 1..].contains('/') => (&body[..pos], Some(&body[pos + 1..])),
        _ => (body, None),
    }
}

fn parse_options(text: &str) -> Result<RuleOpts> {
    let mut opts = RuleOpts::default();

    for raw in text.split(',') {
        let raw = raw.trim().to_ascii_lowercase();
        if raw.is_empty() {
            continue;
        }

        let captures = OPTION_PATTERN
            .captures(&raw)
            .ok_or_else(|| ListError::InvalidRule(format!("Invalid option: {}", raw)))?;
        let negated = !captures[1].is_empty();
        let name = &captures[2];
        let value = captures.get(3).map(|m| m.as_str());

        match (name, value) {
            ("third-party", None) | ("3p", None) => opts.third_party = Some(!negated),
            ("first-party", None) | ("1p", None) => opts.third_party = Some(negated),
            ("match-case", None) => opts.match_case = !negated,
            ("domain", Some(list)) if !negated => parse_domain_option(list, &mut opts)?,
            (name, None) => match ContentType::from_option(name) {
                Some(ty) if negated => opts.types_exclude.push(ty),
                Some(ty) => opts.types_include.push(ty),
                None => opts.unsupported.push(raw.clone()),
            },
            _ => opts.unsupported.push(raw.clone()),
        }
    }

    Ok(opts)
}

fn parse_domain_option(list: &str, opts: &mut RuleOpts) -> Result<()> {
    let mut any = false;
    for entry in list.split('|') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        any = true;
        match entry.strip_prefix('~') {
            Some(domain) => opts.domains_exclude.push(domain.to_string()),
            None => opts.domains_include.push(entry.to_string()),
        }
    }
    if !any {
        return Err(ListError::InvalidRule("Empty domain= option".to_string()));
    }
    Ok(())
}

/// `/.../` is a regex only when the body uses regex syntax; plain paths such as
/// `/adwords/` stay literal.
fn regex_body(pattern: &str) -> Option<&str> {
    let body = pattern.strip_prefix('/')?.strip_suffix('/')?;
    if body.contains(REGEX_META) {
        Some(body)
    } else {
        None
    }
}

const REGEX_META: [char; 8] = ['\\', '[', '(', '{', '+', '?', '$', '|'];

fn parse_pattern(pattern: &str, match_case: bool) -> Vec<RulePart> {
    if let Some(body) = regex_body(pattern) {
        return vec![RulePart::Regex(body.to_string())];
    }

    let mut parts = Vec::new();
    let mut rest = pattern;

    if let Some(r) = rest.strip_prefix("||") {
        parts.push(RulePart::DomainAnchor);
        rest = r;
    } else if let Some(r) = rest.strip_prefix('|') {
        parts.push(RulePart::StartAnchor);
        rest = r;
    }

    let end_anchor = match rest.strip_suffix('|') {
        Some(r) => {
            rest = r;
            true
        }
        None => false,
    };

    let mut text = String::new();
    for c in rest.chars() {
        match c {
            '*' | '^' => {
                if !text.is_empty() {
                    parts.push(RulePart::Exact(std::mem::take(&mut text)));
                }
                if c == '^' {
                    parts.push(RulePart::Separator);
                } else if parts.last() != Some(&RulePart::Wildcard) {
                    parts.push(RulePart::Wildcard);
                }
            }
            c if match_case => text.push(c),
            c => text.extend(c.to_lowercase()),
        }
    }
    if !text.is_empty() {
        parts.push(RulePart::Exact(text));
    }

    if end_anchor {
        parts.push(RulePart::EndAnchor);
    }

    parts
}
