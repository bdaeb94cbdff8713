//! Listener trie keyed by topic segments, with wildcard matching.

use crate::emitter::HookListener;
use hook_wire::topic::{self, DEEP_WILDCARD, WILDCARD};
use std::collections::HashMap;
use std::sync::Arc;

/// One registered listener plus its removal-after-first-delivery flag and a
/// tree-wide registration sequence number.
#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub(crate) listener: Arc<dyn HookListener>,
    pub(crate) once: bool,
    seq: u64,
}

/// A match found for a concrete topic, tagged with the pattern it came from.
#[derive(Clone)]
pub(crate) struct MatchedListener {
    pub(crate) pattern: String,
    pub(crate) entry: ListenerEntry,
}

#[derive(Default)]
struct Node {
    children: HashMap<String, Node>,
    listeners: Vec<ListenerEntry>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.children.is_empty()
    }
}

/// Stores listeners indexed by topic path segments.
///
/// Matching precedence: exact segments, then single-segment wildcards (`*`),
/// then multi-segment wildcards (`**`). Within a class, registration order.
#[derive(Default)]
pub(crate) struct TopicTree {
    root: Node,
    next_seq: u64,
}

impl TopicTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Adds a listener under `pattern`. Returns `true` when it is the first
    /// listener at that pattern.
    pub(crate) fn add(&mut self, pattern: &str, listener: Arc<dyn HookListener>, once: bool) -> bool {
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut node = &mut self.root;
        for segment in topic::split(pattern) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        let first = node.listeners.is_empty();
        node.listeners.push(ListenerEntry {
            listener,
            once,
            seq,
        });
        first
    }

    /// Removes one listener (by `Arc` identity) from `pattern`. Returns `true`
    /// when a listener was actually removed.
    pub(crate) fn remove(&mut self, pattern: &str, listener: &Arc<dyn HookListener>) -> bool {
        let Some(node) = self.node_mut(pattern) else {
            return false;
        };
        let before = node.listeners.len();
        node.listeners
            .retain(|entry| !Arc::ptr_eq(&entry.listener, listener));
        let removed = node.listeners.len() < before;
        if removed {
            self.prune(pattern);
        }
        removed
    }

    /// Removes every listener at `pattern`. Returns how many were removed.
    pub(crate) fn remove_all(&mut self, pattern: &str) -> usize {
        let Some(node) = self.node_mut(pattern) else {
            return 0;
        };
        let removed = node.listeners.len();
        node.listeners.clear();
        if removed > 0 {
            self.prune(pattern);
        }
        removed
    }

    /// Drops every listener and node.
    pub(crate) fn clear(&mut self) {
        self.root = Node::default();
    }

    /// Returns the listeners registered at exactly `pattern`.
    pub(crate) fn listeners_at(&self, pattern: &str) -> Vec<Arc<dyn HookListener>> {
        self.node(pattern)
            .map(|node| {
                node.listeners
                    .iter()
                    .map(|entry| entry.listener.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns every listener whose pattern matches the topic segments, in
    /// precedence order.
    pub(crate) fn matches(&self, parts: &[&str]) -> Vec<MatchedListener> {
        let mut exact = Vec::new();
        let mut star = Vec::new();
        let mut deep = Vec::new();
        let mut path = Vec::new();
        Self::collect(
            &self.root,
            parts,
            false,
            &mut path,
            &mut exact,
            &mut star,
            &mut deep,
        );

        exact.sort_by_key(|matched| matched.entry.seq);
        star.sort_by_key(|matched| matched.entry.seq);
        deep.sort_by_key(|matched| matched.entry.seq);

        exact.extend(star);
        exact.extend(deep);
        exact
    }

    /// Returns `true` when at least one pattern matches the topic segments.
    pub(crate) fn matches_any(&self, parts: &[&str]) -> bool {
        !self.matches(parts).is_empty()
    }

    /// Enumerates the pattern of every node holding at least one listener.
    pub(crate) fn enumerate(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        Self::walk(&self.root, &mut path, &mut out);
        out
    }

    fn node(&self, pattern: &str) -> Option<&Node> {
        let mut node = &self.root;
        for segment in topic::split(pattern) {
            node = node.children.get(segment)?;
        }
        Some(node)
    }

    fn node_mut(&mut self, pattern: &str) -> Option<&mut Node> {
        let mut node = &mut self.root;
        for segment in topic::split(pattern) {
            node = node.children.get_mut(segment)?;
        }
        Some(node)
    }

    /// Drops empty nodes along `pattern` so enumeration stays exact.
    fn prune(&mut self, pattern: &str) {
        fn prune_from(node: &mut Node, segments: &[&str]) {
            let Some((head, rest)) = segments.split_first() else {
                return;
            };
            if let Some(child) = node.children.get_mut(*head) {
                prune_from(child, rest);
                if child.is_empty() {
                    node.children.remove(*head);
                }
            }
        }
        let segments = topic::split(pattern);
        prune_from(&mut self.root, &segments);
    }

    #[allow(clippy::too_many_arguments)]
    fn collect(
        node: &Node,
        parts: &[&str],
        via_star: bool,
        path: &mut Vec<String>,
        exact: &mut Vec<MatchedListener>,
        star: &mut Vec<MatchedListener>,
        deep: &mut Vec<MatchedListener>,
    ) {
        let tag = |node: &Node, path: &[String], out: &mut Vec<MatchedListener>| {
            let pattern = path.join(topic::DELIMITER);
            out.extend(node.listeners.iter().map(|entry| MatchedListener {
                pattern: pattern.clone(),
                entry: entry.clone(),
            }));
        };

        // `**` matches zero or more remaining segments from this point on.
        if let Some(deep_child) = node.children.get(DEEP_WILDCARD) {
            path.push(DEEP_WILDCARD.to_string());
            tag(deep_child, path, deep);
            path.pop();
        }

        let Some((head, rest)) = parts.split_first() else {
            tag(node, path, if via_star { star } else { exact });
            return;
        };

        if let Some(child) = node.children.get(*head) {
            path.push((*head).to_string());
            Self::collect(child, rest, via_star, path, exact, star, deep);
            path.pop();
        }
        if *head != WILDCARD {
            if let Some(child) = node.children.get(WILDCARD) {
                path.push(WILDCARD.to_string());
                Self::collect(child, rest, true, path, exact, star, deep);
                path.pop();
            }
        }
    }

    fn walk(node: &Node, path: &mut Vec<String>, out: &mut Vec<String>) {
        if !node.listeners.is_empty() {
            out.push(path.join(topic::DELIMITER));
        }
        for (segment, child) in &node.children {
            path.push(segment.clone());
            Self::walk(child, path, out);
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::{listener_fn, Event};

    fn noop() -> Arc<dyn HookListener> {
        listener_fn(|_event: Event| {})
    }

    fn patterns_matching(tree: &TopicTree, topic_str: &str) -> Vec<String> {
        let parts = topic::split(topic_str);
        tree.matches(&parts)
            .into_iter()
            .map(|matched| matched.pattern)
            .collect()
    }

    #[test]
    fn single_segment_wildcard_matches_exactly_one_segment() {
        let mut tree = TopicTree::new();
        tree.add("a::*::c", noop(), false);

        assert!(tree.matches_any(&topic::split("a::b::c")));
        assert!(tree.matches_any(&topic::split("a::x::c")));
        assert!(!tree.matches_any(&topic::split("a::b::d")));
        assert!(!tree.matches_any(&topic::split("a::c")));
    }

    #[test]
    fn deep_wildcard_matches_zero_or_more_trailing_segments() {
        let mut tree = TopicTree::new();
        tree.add("a::**", noop(), false);

        assert!(tree.matches_any(&topic::split("a")));
        assert!(tree.matches_any(&topic::split("a::b")));
        assert!(tree.matches_any(&topic::split("a::b::c")));
        assert!(!tree.matches_any(&topic::split("b::a")));
    }

    #[test]
    fn match_order_is_exact_then_star_then_deep() {
        let mut tree = TopicTree::new();
        tree.add("a::**", noop(), false);
        tree.add("a::*", noop(), false);
        tree.add("a::b", noop(), false);

        assert_eq!(
            patterns_matching(&tree, "a::b"),
            vec!["a::b".to_string(), "a::*".to_string(), "a::**".to_string()]
        );
    }

    #[test]
    fn registration_order_is_stable_within_a_class() {
        let mut tree = TopicTree::new();
        let first = noop();
        let second = noop();
        tree.add("*::done", first.clone(), false);
        tree.add("jobs::*", second.clone(), false);

        let matched = tree.matches(&topic::split("jobs::done"));
        assert_eq!(matched.len(), 2);
        assert!(Arc::ptr_eq(&matched[0].entry.listener, &first));
        assert!(Arc::ptr_eq(&matched[1].entry.listener, &second));
    }

    #[test]
    fn add_reports_first_listener_only_once() {
        let mut tree = TopicTree::new();
        assert!(tree.add("alpha::*", noop(), false));
        assert!(!tree.add("alpha::*", noop(), false));
    }

    #[test]
    fn remove_is_by_identity_and_reports_success() {
        let mut tree = TopicTree::new();
        let keep = noop();
        let drop = noop();
        tree.add("jobs", keep.clone(), false);
        tree.add("jobs", drop.clone(), false);

        assert!(tree.remove("jobs", &drop));
        assert!(!tree.remove("jobs", &drop));
        assert_eq!(tree.listeners_at("jobs").len(), 1);
    }

    #[test]
    fn enumerate_lists_exactly_the_populated_patterns() {
        let mut tree = TopicTree::new();
        let listener = noop();
        tree.add("a::b", listener.clone(), false);
        tree.add("a::*::c", noop(), false);

        let mut patterns = tree.enumerate();
        patterns.sort();
        assert_eq!(patterns, vec!["a::*::c".to_string(), "a::b".to_string()]);

        tree.remove("a::b", &listener);
        assert_eq!(tree.enumerate(), vec!["a::*::c".to_string()]);
    }

    #[test]
    fn remove_all_empties_one_pattern_only() {
        let mut tree = TopicTree::new();
        tree.add("a::b", noop(), false);
        tree.add("a::b", noop(), false);
        tree.add("a::c", noop(), false);

        assert_eq!(tree.remove_all("a::b"), 2);
        assert!(!tree.matches_any(&topic::split("a::b")));
        assert!(tree.matches_any(&topic::split("a::c")));
    }
}
