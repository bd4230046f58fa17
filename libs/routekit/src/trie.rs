//! Segment trie shared by the HTTP and realtime matchers.
//!
//! One tree per method holds static, parameter (`:name`) and wildcard
//! (`*`) children. Matching tries children in priority order
//! static > param > wildcard and backtracks captured parameters when a
//! deeper branch fails.

use std::sync::Arc;

use crate::error::RouterError;

/// One trie node. `segment` is the literal text for static children and
/// the parameter name for the param child.
#[derive(Debug)]
pub(crate) struct Node<T> {
    segment: String,
    static_children: Vec<Node<T>>,
    param_child: Option<Box<Node<T>>>,
    wildcard: Option<Arc<T>>,
    terminal: Option<Arc<T>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            segment: String::new(),
            static_children: Vec::new(),
            param_child: None,
            wildcard: None,
            terminal: None,
        }
    }
}

impl<T> Node<T> {
    /// Insert a terminal under `pattern` (`:name` form; `{name}` must be
    /// normalized by the caller). Returns the previous terminal when the
    /// exact pattern was already registered (last registration wins).
    pub fn insert(&mut self, pattern: &str, value: Arc<T>) -> Result<Option<Arc<T>>, RouterError> {
        let rest = pattern.strip_prefix('/').unwrap_or(pattern);
        if rest.is_empty() {
            return Ok(self.terminal.replace(value));
        }
        self.insert_segments(pattern, rest, value)
    }

    fn insert_segments(
        &mut self,
        pattern: &str,
        rest: &str,
        value: Arc<T>,
    ) -> Result<Option<Arc<T>>, RouterError> {
        let (segment, remainder) = match rest.split_once('/') {
            Some((s, r)) => (s, Some(r)),
            None => (rest, None),
        };

        if segment == "*" {
            if remainder.is_some_and(|r| !r.is_empty()) {
                return Err(RouterError::WildcardNotLast {
                    pattern: pattern.to_owned(),
                });
            }
            return Ok(self.wildcard.replace(value));
        }

        let child: &mut Node<T> = if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() {
                return Err(RouterError::InvalidPattern {
                    pattern: pattern.to_owned(),
                    reason: "parameter segment requires a name".to_owned(),
                });
            }
            if let Some(existing) = &self.param_child
                && existing.segment != name
            {
                return Err(RouterError::ParamNameConflict {
                    pattern: pattern.to_owned(),
                    existing: existing.segment.clone(),
                    conflicting: name.to_owned(),
                });
            }
            self.param_child
                .get_or_insert_with(|| {
                    Box::new(Node {
                        segment: name.to_owned(),
                        ..Node::default()
                    })
                })
                .as_mut()
        } else {
            let idx = match self
                .static_children
                .iter()
                .position(|c| c.segment == segment)
            {
                Some(i) => i,
                None => {
                    self.static_children.push(Node {
                        segment: segment.to_owned(),
                        ..Node::default()
                    });
                    self.static_children.len() - 1
                }
            };
            &mut self.static_children[idx]
        };

        match remainder {
            Some(r) => child.insert_segments(pattern, r, value),
            None => Ok(child.terminal.replace(value)),
        }
    }

    /// Match `path`, capturing parameters into `params`. Captures made
    /// along branches that fail deeper down are removed before the next
    /// sibling is tried.
    pub fn lookup(&self, path: &str, params: &mut crate::params::ParamVector) -> Option<Arc<T>> {
        let rest = path.strip_prefix('/').unwrap_or(path);
        if rest.is_empty() {
            return self.terminal.clone();
        }
        self.lookup_segments(rest, params)
    }

    fn lookup_segments(
        &self,
        rest: &str,
        params: &mut crate::params::ParamVector,
    ) -> Option<Arc<T>> {
        let (segment, remainder) = match rest.split_once('/') {
            Some((s, r)) => (s, Some(r)),
            None => (rest, None),
        };

        // Static children have unique segments, so at most one can match.
        for child in &self.static_children {
            if child.segment == segment {
                let found = match remainder {
                    Some(r) => child.lookup_segments(r, params),
                    None => child.terminal.clone(),
                };
                if found.is_some() {
                    return found;
                }
                break;
            }
        }

        // An empty segment (trailing slash) never binds a parameter.
        if !segment.is_empty()
            && let Some(child) = &self.param_child
        {
            params.set(&child.segment, segment);
            let found = match remainder {
                Some(r) => child.lookup_segments(r, params),
                None => child.terminal.clone(),
            };
            if found.is_some() {
                return found;
            }
            params.remove(&child.segment);
        }

        // Wildcard consumes the remainder of the path, no capture.
        self.wildcard.clone()
    }

    /// Whether `path` would match anything in this tree.
    pub fn matches(&self, path: &str) -> bool {
        let mut scratch = crate::params::ParamVector::new();
        self.lookup(path, &mut scratch).is_some()
    }
}
