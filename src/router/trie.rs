//! Segment trie used to resolve request paths.
//!
//! Patterns are split on `/` into three kinds of segments: literals
//! (`users`), named parameters (`:id`) and a trailing wildcard (`*`). Every
//! node has at most one parameter child and one wildcard child, so resolving a
//! path walks a single branch and costs O(path length) no matter how many
//! routes are registered.
//!
//! At each level a literal match wins over the parameter child, which wins
//! over the wildcard. The walk never backtracks.

use crate::error::RouteError;
use crate::http::Method;
use crate::router::params::{Params, WILDCARD};
use std::collections::HashMap;

pub struct Trie<T> {
    root: Node<T>,
}

struct Node<T> {
    statics: HashMap<String, Node<T>>,
    param: Option<Box<Node<T>>>,
    // Set on parameter nodes only.
    param_name: String,
    wildcard: Option<Box<Node<T>>>,
    handlers: HashMap<Method, T>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self::named(String::new())
    }

    fn named(param_name: String) -> Self {
        Self {
            statics: HashMap::new(),
            param: None,
            param_name,
            wildcard: None,
            handlers: HashMap::new(),
        }
    }
}

impl<T> Default for Trie<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Trie<T> {
    pub fn new() -> Self {
        Self { root: Node::new() }
    }

    /// Registers `value` for `method` at `pattern`.
    ///
    /// Returns the value previously registered for the same method and
    /// pattern, if any. Two parameter names at the same depth are rejected.
    pub fn insert(&mut self, method: Method, pattern: &str, value: T) -> Result<Option<T>, RouteError> {
        let segments: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();

        for (i, segment) in segments.iter().enumerate() {
            if *segment == WILDCARD && i + 1 != segments.len() {
                return Err(RouteError::WildcardNotLast {
                    pattern: pattern.to_string(),
                });
            }
            if *segment == ":" {
                return Err(RouteError::EmptyParameter {
                    pattern: pattern.to_string(),
                });
            }
        }

        let mut node = &mut self.root;
        for segment in segments {
            node = if let Some(name) = segment.strip_prefix(':') {
                let child: &mut Node<T> = node
                    .param
                    .get_or_insert_with(|| Box::new(Node::named(name.to_string())));
                if child.param_name != name {
                    return Err(RouteError::ConflictingParameter {
                        pattern: pattern.to_string(),
                        existing: child.param_name.clone(),
                        new: name.to_string(),
                    });
                }
                child
            } else if segment == WILDCARD {
                node.wildcard.get_or_insert_with(|| Box::new(Node::new()))
            } else {
                node.statics.entry(segment.to_string()).or_insert_with(Node::new)
            };
        }

        Ok(node.handlers.insert(method, value))
    }

    /// Looks up the value for `method` at `path`, filling `params` with the
    /// captured segments. On a miss `params` is left empty.
    pub fn resolve(&self, method: Method, path: &str, params: &mut Params) -> Option<&T> {
        let found = self
            .walk(path, |name, value| params.insert(name, value))
            .and_then(|node| node.handlers.get(&method));
        if found.is_none() {
            params.clear();
        }
        found
    }

    /// Whether `path` resolves for `method`, without capturing anything.
    pub fn matches(&self, method: Method, path: &str) -> bool {
        self.walk(path, |_, _| {})
            .map(|node| node.handlers.contains_key(&method))
            .unwrap_or(false)
    }

    fn walk<'a>(&'a self, path: &str, mut capture: impl FnMut(&str, &str)) -> Option<&'a Node<T>> {
        let mut node = &self.root;
        let mut rest = path;
        loop {
            rest = rest.trim_start_matches('/');
            if rest.is_empty() {
                return Some(node);
            }
            let (segment, tail) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, ""),
            };

            if let Some(child) = node.statics.get(segment) {
                node = child;
            } else if let Some(child) = node.param.as_deref() {
                capture(&child.param_name, segment);
                node = child;
            } else if let Some(child) = node.wildcard.as_deref() {
                capture(WILDCARD, rest.trim_end_matches('/'));
                return Some(child);
            } else {
                return None;
            }
            rest = tail;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trie(routes: &[(Method, &str)]) -> Trie<String> {
        let mut trie = Trie::new();
        for (method, pattern) in routes {
            trie.insert(*method, pattern, format!("{} {}", method, pattern))
                .unwrap();
        }
        trie
    }

    fn lookup(trie: &Trie<String>, method: Method, path: &str) -> Option<(String, Params)> {
        let mut params = Params::new();
        trie.resolve(method, path, &mut params)
            .map(|v| (v.clone(), params.clone()))
    }

    #[test]
    fn static_routes_resolve_only_for_their_method() {
        let trie = trie(&[
            (Method::GET, "/"),
            (Method::GET, "/users"),
            (Method::POST, "/users"),
            (Method::GET, "/users/admins/list"),
        ]);

        assert_eq!(lookup(&trie, Method::GET, "/").unwrap().0, "GET /");
        assert_eq!(lookup(&trie, Method::GET, "/users").unwrap().0, "GET /users");
        assert_eq!(lookup(&trie, Method::POST, "/users").unwrap().0, "POST /users");
        assert_eq!(
            lookup(&trie, Method::GET, "/users/admins/list").unwrap().0,
            "GET /users/admins/list"
        );
        assert!(lookup(&trie, Method::DELETE, "/users").is_none());
        assert!(lookup(&trie, Method::GET, "/users/admins").is_none());
        assert!(lookup(&trie, Method::GET, "/nope").is_none());
    }

    #[test]
    fn empty_segments_are_ignored() {
        let trie = trie(&[(Method::GET, "/users/list/")]);
        assert!(lookup(&trie, Method::GET, "/users/list").is_some());
        assert!(lookup(&trie, Method::GET, "//users//list/").is_some());
    }

    #[test]
    fn named_parameters_are_captured() {
        let trie = trie(&[(Method::GET, "/users/:id/posts/:post")]);
        let (_, params) = lookup(&trie, Method::GET, "/users/42/posts/7").unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.get("post"), Some("7"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn wildcard_captures_the_remaining_path() {
        let trie = trie(&[(Method::GET, "/files/*")]);
        let (_, params) = lookup(&trie, Method::GET, "/files/a/b/c").unwrap();
        assert_eq!(params.wildcard(), Some("a/b/c"));

        let (_, params) = lookup(&trie, Method::GET, "/files/readme.md/").unwrap();
        assert_eq!(params.wildcard(), Some("readme.md"));

        assert!(lookup(&trie, Method::GET, "/files").is_none());
    }

    #[test]
    fn literal_beats_parameter_beats_wildcard() {
        let trie = trie(&[
            (Method::GET, "/users/:id"),
            (Method::GET, "/users/new"),
            (Method::GET, "/assets/:name"),
            (Method::GET, "/assets/*"),
        ]);

        let (handler, params) = lookup(&trie, Method::GET, "/users/new").unwrap();
        assert_eq!(handler, "GET /users/new");
        assert!(params.is_empty());

        let (handler, params) = lookup(&trie, Method::GET, "/users/17").unwrap();
        assert_eq!(handler, "GET /users/:id");
        assert_eq!(params.get("id"), Some("17"));

        let (handler, _) = lookup(&trie, Method::GET, "/assets/logo.png").unwrap();
        assert_eq!(handler, "GET /assets/:name");
    }

    #[test]
    fn resolution_does_not_backtrack() {
        let trie = trie(&[(Method::GET, "/users/new/edit"), (Method::GET, "/users/:id/posts")]);
        assert!(lookup(&trie, Method::GET, "/users/new/posts").is_none());
        assert!(lookup(&trie, Method::GET, "/users/5/posts").is_some());
    }

    #[test]
    fn failed_lookup_leaves_no_params() {
        let trie = trie(&[(Method::GET, "/users/:id/posts")]);
        let mut params = Params::new();
        assert!(trie.resolve(Method::GET, "/users/9/comments", &mut params).is_none());
        assert!(params.is_empty());
    }

    #[test]
    fn conflicting_parameter_names_are_rejected() {
        let mut trie = Trie::new();
        trie.insert(Method::GET, "/users/:id", 1).unwrap();
        trie.insert(Method::POST, "/users/:id/avatar", 2).unwrap();

        let err = trie.insert(Method::PUT, "/users/:name", 3).unwrap_err();
        assert_eq!(
            err,
            RouteError::ConflictingParameter {
                pattern: "/users/:name".into(),
                existing: "id".into(),
                new: "name".into(),
            }
        );
        assert!(!trie.matches(Method::PUT, "/users/ada"));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        let mut trie = Trie::new();
        assert!(matches!(
            trie.insert(Method::GET, "/files/*/raw", ()),
            Err(RouteError::WildcardNotLast { .. })
        ));
        assert!(matches!(
            trie.insert(Method::GET, "/users/:", ()),
            Err(RouteError::EmptyParameter { .. })
        ));
    }

    #[test]
    fn reinserting_returns_the_previous_value() {
        let mut trie = Trie::new();
        assert_eq!(trie.insert(Method::GET, "/a", 1).unwrap(), None);
        assert_eq!(trie.insert(Method::GET, "/a", 2).unwrap(), Some(1));
        assert_eq!(trie.resolve(Method::GET, "/a", &mut Params::new()), Some(&2));
    }

    #[test]
    fn lookup_cost_does_not_depend_on_route_count() {
        let mut trie = Trie::new();
        for i in 0..5_000 {
            trie.insert(Method::GET, &format!("/r{}/items/:id", i), i).unwrap();
        }
        let mut params = Params::new();
        assert_eq!(trie.resolve(Method::GET, "/r4999/items/abc", &mut params), Some(&4999));
        assert_eq!(params.get("id"), Some("abc"));
    }
}
