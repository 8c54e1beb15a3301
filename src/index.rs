//! Domain index.
//!
//! Maps anchor domains to their buckets with longest-ancestor lookup. Keys are
//! stored reversed with the label separator placed in front of the domain
//! before reversal (`example.com` -> `moc.elpmaxe.`), so a prefix of a query
//! key always ends on a label boundary: `notexample.com` -> `moc.elpmaxeton.`
//! does not start with `moc.elpmaxe.`.

use std::collections::HashMap;

use crate::rule::RuleMatcher;

/// Label separator placed at the boundary of every key
const SEPARATOR: u8 = b'.';

#[derive(Debug, Default, Clone)]
struct Node {
    /// Sorted by byte for binary search
    children: Vec<(u8, u32)>,
    /// Index into `DomainIndex::entries`
    entry: Option<u32>,
}

impl Node {
    fn child(&self, b: u8) -> Option<u32> {
        self.children
            .binary_search_by_key(&b, |&(k, _)| k)
            .ok()
            .map(|i| self.children[i].1)
    }
}

/// Immutable prefix tree from reversed domain keys to values
#[derive(Debug)]
pub struct DomainIndex<T = RuleMatcher> {
    nodes: Vec<Node>,
    entries: Vec<(String, T)>,
}

impl<T> DomainIndex<T> {
    /// Build the index from `(domain, value)` pairs. Domains are expected to
    /// be lowercase and without port.
    pub fn build(items: impl IntoIterator<Item = (String, T)>) -> Self {
        let mut index = Self {
            nodes: vec![Node::default()],
            entries: Vec::new(),
        };
        for (domain, value) in items {
            index.insert(domain, value);
        }
        index.nodes.shrink_to_fit();
        index
    }

    fn insert(&mut self, domain: String, value: T) {
        let mut cur = 0usize;
        for b in reversed_key(&domain) {
            cur = match self.nodes[cur].child(b) {
                Some(id) => id as usize,
                None => {
                    let id = self.nodes.len() as u32;
                    self.nodes.push(Node::default());
                    let children = &mut self.nodes[cur].children;
                    let pos = children.partition_point(|&(k, _)| k < b);
                    children.insert(pos, (b, id));
                    id as usize
                }
            };
        }

        match self.nodes[cur].entry {
            // Duplicate domain: last value wins, the old one is dropped
            Some(existing) => self.entries[existing as usize] = (domain, value),
            None => {
                self.nodes[cur].entry = Some(self.entries.len() as u32);
                self.entries.push((domain, value));
            }
        }
    }

    /// Find the value registered for `host` or its closest ancestor domain.
    pub fn lookup(&self, host: &str) -> Option<&T> {
        self.lookup_entry(host).map(|(_, value)| value)
    }

    /// Like [`lookup`](Self::lookup), also returning the matched domain.
    pub fn lookup_entry(&self, host: &str) -> Option<(&str, &T)> {
        if host.is_empty() {
            return None;
        }

        let mut best = None;
        let mut cur = 0usize;
        for b in reversed_key(host) {
            match self.nodes[cur].child(b) {
                Some(id) => cur = id as usize,
                None => break,
            }
            // Entries sit on nodes reached by a separator, so any hit here is
            // label-aligned
            if let Some(entry) = self.nodes[cur].entry {
                best = Some(entry);
            }
        }

        best.map(|i| {
            let (domain, value) = &self.entries[i as usize];
            (domain.as_str(), value)
        })
    }

    /// Number of domains in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over indexed domains
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(d, _)| d.as_str())
    }
}

impl<T> From<HashMap<String, T>> for DomainIndex<T> {
    fn from(map: HashMap<String, T>) -> Self {
        Self::build(map)
    }
}

/// Bytes of the reversed key for `domain`: the domain reversed, followed by
/// the separator.
pub fn reversed_key(domain: &str) -> impl Iterator<Item = u8> + '_ {
    domain
        .as_bytes()
        .iter()
        .rev()
        .copied()
        .chain(std::iter::once(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(domains: &[&str]) -> DomainIndex<&'static str> {
        let owned: Vec<(String, &'static str)> = domains
            .iter()
            .map(|d| (d.to_string(), "v"))
            .collect();
        DomainIndex::build(owned)
    }

    fn resolved<'a>(idx: &'a DomainIndex<&'static str>, host: &str) -> Option<&'a str> {
        idx.lookup_entry(host).map(|(d, _)| d)
    }

    #[test]
    fn test_reversed_key() {
        let key: Vec<u8> = reversed_key("example.com").collect();
        assert_eq!(key, b"moc.elpmaxe.");
    }

    #[test]
    fn test_empty_index() {
        let idx = index(&[]);
        assert!(idx.is_empty());
        assert_eq!(resolved(&idx, "example.com"), None);
    }

    #[test]
    fn test_exact_and_subdomain_lookup() {
        let idx = index(&["example.com"]);
        assert_eq!(resolved(&idx, "example.com"), Some("example.com"));
        assert_eq!(resolved(&idx, "www.example.com"), Some("example.com"));
        assert_eq!(resolved(&idx, "a.b.c.example.com"), Some("example.com"));
    }

    #[test]
    fn test_longest_ancestor_wins() {
        let idx = index(&["example.com", "tracker.example.com"]);
        assert_eq!(
            resolved(&idx, "ads.tracker.example.com"),
            Some("tracker.example.com")
        );
        assert_eq!(resolved(&idx, "tracker.example.com"), Some("tracker.example.com"));
        assert_eq!(resolved(&idx, "other.example.com"), Some("example.com"));
    }

    #[test]
    fn test_label_boundary() {
        let idx = index(&["example.com"]);
        assert_eq!(resolved(&idx, "notexample.com"), None);
        assert_eq!(resolved(&idx, "evil-example.com"), None);
        assert_eq!(resolved(&idx, "example.com.evil.org"), None);
        assert_eq!(resolved(&idx, "com"), None);
        assert_eq!(resolved(&idx, ""), None);
    }

    #[test]
    fn test_shorter_domain_inside_longer_key() {
        // "ample.com" is a character suffix of "example.com" but not an ancestor
        let idx = index(&["ample.com", "example.com"]);
        assert_eq!(resolved(&idx, "www.example.com"), Some("example.com"));
        assert_eq!(resolved(&idx, "www.ample.com"), Some("ample.com"));
        assert_eq!(resolved(&idx, "xample.com"), None);
    }

    #[test]
    fn test_duplicate_domain_last_wins() {
        let idx = DomainIndex::build(vec![
            ("example.com".to_string(), 1),
            ("example.com".to_string(), 2),
        ]);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.lookup("example.com"), Some(&2));
    }

    #[test]
    fn test_from_hash_map() {
        let mut map = HashMap::new();
        map.insert("doubleclick.net".to_string(), 7);
        let idx = DomainIndex::from(map);
        assert_eq!(idx.lookup("googleads.g.doubleclick.net"), Some(&7));
        assert_eq!(idx.domains().collect::<Vec<_>>(), vec!["doubleclick.net"]);
    }
}
