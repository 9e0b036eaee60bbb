use http::Method;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default expression for a `{name}` placeholder.
const DEFAULT_SEGMENT: &str = "[^/]+";

/// Compile a route pattern into an anchored regex.
///
/// `{name}` matches one path segment, `{name:expr}` matches `expr`. Literal
/// text is escaped. Returns the regex and the placeholder names in order.
pub fn path_to_regex(path: &str) -> Result<(Regex, Vec<String>), regex::Error> {
    let mut pattern = String::with_capacity(path.len() + 8);
    pattern.push('^');
    let mut names = Vec::with_capacity(path.matches('{').count());

    let mut chars = path.char_indices().peekable();
    let mut literal_start = 0;
    while let Some((idx, ch)) = chars.next() {
        if ch != '{' {
            continue;
        }
        pattern.push_str(&regex::escape(&path[literal_start..idx]));

        // Placeholder bodies may themselves contain braces (`\d{2}`).
        let mut depth = 1;
        let mut end = None;
        for (j, c) in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(j);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            // Unbalanced brace: treat the rest as literal text.
            literal_start = idx;
            break;
        };
        let body = &path[idx + 1..end];
        let (name, expr) = match body.split_once(':') {
            Some((name, expr)) => (name.trim(), expr),
            None => (body.trim(), DEFAULT_SEGMENT),
        };
        pattern.push_str("(?P<");
        pattern.push_str(&group_name(names.len()));
        pattern.push('>');
        pattern.push_str(expr);
        pattern.push(')');
        names.push(name.to_string());
        literal_start = end + 1;
    }
    if literal_start < path.len() {
        pattern.push_str(&regex::escape(&path[literal_start..]));
    }
    pattern.push('$');

    Ok((Regex::new(&pattern)?, names))
}

/// Capture group holding the placeholder at `idx`. Groups inside custom
/// expressions stay unnamed.
fn group_name(idx: usize) -> String {
    format!("__p{idx}")
}

/// Placeholder values captured by a regex built with [`path_to_regex`].
pub fn captured_params(caps: &Captures<'_>, names: &[String]) -> BTreeMap<String, String> {
    names
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| {
            caps.name(&group_name(idx))
                .map(|m| (name.clone(), m.as_str().to_string()))
        })
        .collect()
}

/// Drop custom placeholder expressions: `/a/{id:\d+}` becomes `/a/{id}`.
pub fn canonical_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut depth = 0usize;
    let mut skipping = false;
    for ch in pattern.chars() {
        match ch {
            '{' => {
                depth += 1;
                if depth == 1 {
                    out.push('{');
                    continue;
                }
            }
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    skipping = false;
                    out.push('}');
                    continue;
                }
            }
            ':' if depth == 1 => {
                skipping = true;
                continue;
            }
            _ => {}
        }
        if !skipping {
            out.push(ch);
        }
    }
    out
}

/// A named route registration.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub pattern: String,
    /// Request method predicate; `None` matches every method.
    pub method: Option<Method>,
    /// Name of the root factory producing the request context.
    pub factory: Option<String>,
    regex: Regex,
    params: Vec<String>,
}

impl Route {
    pub fn new(name: &str, pattern: &str, method: Option<Method>) -> Result<Self, regex::Error> {
        let (regex, params) = path_to_regex(pattern)?;
        Ok(Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            method,
            factory: None,
            regex,
            params,
        })
    }

    /// Captured path parameters when `path` matches this route.
    pub fn match_path(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let caps = self.regex.captures(path)?;
        Some(captured_params(&caps, &self.params))
    }
}

/// Ordered route table; the first registered match wins.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route. A route with the same name replaces the old one
    /// in place.
    pub fn add(&mut self, route: Route) {
        if let Some(existing) = self.routes.iter_mut().find(|r| r.name == route.name) {
            warn!(route = %route.name, "Replacing existing route registration");
            *existing = route;
        } else {
            self.routes.push(route);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.name == name)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn route(&self, method: &Method, path: &str) -> Option<(&Route, BTreeMap<String, String>)> {
        for route in &self.routes {
            if route.method.as_ref().is_some_and(|m| m != method) {
                continue;
            }
            if let Some(params) = route.match_path(path) {
                debug!(route = %route.name, %method, path, "Route matched");
                return Some((route, params));
            }
        }
        debug!(%method, path, "No route matched");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_to_regex_placeholders() {
        let (re, names) = path_to_regex("/users/{id}/posts/{post_id}").unwrap();
        assert_eq!(names, vec!["id", "post_id"]);
        assert!(re.is_match("/users/1/posts/abc"));
        assert!(!re.is_match("/users/1/posts"));
    }

    #[test]
    fn test_path_to_regex_custom_expression() {
        let (re, names) = path_to_regex(r"/items/{id:\d{2}}").unwrap();
        assert_eq!(names, vec!["id"]);
        assert!(re.is_match("/items/12"));
        assert!(!re.is_match("/items/123"));
    }

    #[test]
    fn test_groups_inside_expressions_keep_params_aligned() {
        let route = Route::new("kind", "/x/{kind:(a|b)}/{id}", None).unwrap();
        let params = route.match_path("/x/a/7").unwrap();
        assert_eq!(params.get("kind").map(String::as_str), Some("a"));
        assert_eq!(params.get("id").map(String::as_str), Some("7"));
        assert!(route.match_path("/x/c/7").is_none());
    }

    #[test]
    fn test_path_to_regex_escapes_literals() {
        let (re, _) = path_to_regex("/spec/openapi.yaml").unwrap();
        assert!(re.is_match("/spec/openapi.yaml"));
        assert!(!re.is_match("/spec/openapiXyaml"));
    }

    #[test]
    fn test_canonical_pattern() {
        assert_eq!(canonical_pattern(r"/a/{id:\d+}/b"), "/a/{id}/b");
        assert_eq!(canonical_pattern(r"/a/{id:\d{2}}"), "/a/{id}");
        assert_eq!(canonical_pattern("/a/{id}"), "/a/{id}");
    }

    #[test]
    fn test_router_method_predicate_and_order() {
        let mut router = Router::new();
        router.add(Route::new("post_foo", "/foo", Some(Method::POST)).unwrap());
        router.add(Route::new("any_foo", "/foo", None).unwrap());

        let (route, _) = router.route(&Method::POST, "/foo").unwrap();
        assert_eq!(route.name, "post_foo");
        let (route, _) = router.route(&Method::GET, "/foo").unwrap();
        assert_eq!(route.name, "any_foo");
        assert!(router.route(&Method::GET, "/bar").is_none());
    }

    #[test]
    fn test_router_captures_params() {
        let mut router = Router::new();
        router.add(Route::new("foo", "/foo/{foo_id}", None).unwrap());
        let (_, params) = router.route(&Method::GET, "/foo/42").unwrap();
        assert_eq!(params.get("foo_id").map(String::as_str), Some("42"));
    }
}
