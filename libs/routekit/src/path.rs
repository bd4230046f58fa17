//! Path canonicalization used for matching and redirect candidates.

/// Canonical form of a request path: leading slash guaranteed, `.` and
/// `..` segments collapsed, duplicate slashes removed. A trailing slash is
/// preserved only when the original had one (the root is always `/`).
#[must_use]
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    let trailing = path.len() > 1 && path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    out.push_str(&segments.join("/"));
    if trailing && out.len() > 1 {
        out.push('/');
    }
    out
}

/// Ensure a leading slash without touching anything else; the cheap
/// normalization applied to every incoming request (`""` becomes `/`).
#[must_use]
pub fn ensure_leading_slash(path: &str) -> String {
    if path.is_empty() {
        "/".to_owned()
    } else if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

/// Toggle the trailing slash: `/test/` becomes `/test` and vice versa.
/// The root has no alternate form.
#[must_use]
pub fn toggle_trailing_slash(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    if let Some(stripped) = path.strip_suffix('/') {
        Some(stripped.to_owned())
    } else {
        Some(format!("{path}/"))
    }
}

/// Normalize a registration pattern: `{name}` segments become `:name`.
#[must_use]
pub fn normalize_pattern(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| {
            if segment.len() > 2 && segment.starts_with('{') && segment.ends_with('}') {
                format!(":{}", &segment[1..segment.len() - 1])
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Render a trie pattern in documentation form: `:name` becomes `{name}`
/// and a trailing wildcard becomes `{wildcard}`.
#[must_use]
pub fn documentation_path(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if segment == "*" {
                "{wildcard}".to_owned()
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Names of the `:name` parameters in a pattern, in order.
#[must_use]
pub fn pattern_param_names(pattern: &str) -> Vec<String> {
    pattern
        .split('/')
        .filter_map(|segment| segment.strip_prefix(':').map(ToOwned::to_owned))
        .collect()
}
