//! Resolution of a request URI to its path configuration.

use axum::http::{HeaderMap, Method};

use crate::path::PathConfiguration;

/// Pattern matching every resource. Only used when nothing else matches.
const ANY_RESOURCE: &str = "/*";

/// Resolves request URIs against the configured path patterns.
///
/// Configurations sharing a pattern are grouped under it in registration
/// order. Matching never mutates the table, so one matcher serves any number
/// of concurrent requests.
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    entries: Vec<(String, Vec<PathConfiguration>)>,
}

impl PathMatcher {
    /// Builds the pattern table.
    #[must_use]
    pub fn new<I: IntoIterator<Item = PathConfiguration>>(paths: I) -> Self {
        let mut entries: Vec<(String, Vec<PathConfiguration>)> = Vec::new();
        for path in paths {
            match entries.iter_mut().find(|(uri, _)| uri == path.uri()) {
                Some((_, group)) => group.push(path),
                None => entries.push((path.uri().to_string(), vec![path])),
            }
        }
        Self { entries }
    }

    /// Returns every configuration in registration order.
    pub fn paths(&self) -> impl Iterator<Item = &PathConfiguration> {
        self.entries.iter().flat_map(|(_, group)| group.iter())
    }

    /// Returns the configuration applying to a request, or `None` when the
    /// request is not covered by any pattern.
    #[must_use]
    pub fn match_path(
        &self,
        request_uri: &str,
        context_path: &str,
        method: &Method,
        headers: &HeaderMap,
    ) -> Option<&PathConfiguration> {
        let uri = strip_context(request_uri, context_path);

        let mut any_resource = None;
        let mut best: Option<(&[PathConfiguration], &str)> = None;

        for (pattern, group) in &self.entries {
            if pattern == uri {
                return select(group, method, headers);
            }

            if pattern == ANY_RESOURCE {
                any_resource.get_or_insert(group.as_slice());
                continue;
            }

            if !pattern_matches(pattern, uri) {
                continue;
            }

            let prefix = literal_prefix(pattern);
            match best {
                Some((_, best_prefix))
                    if !(prefix.starts_with(best_prefix) && prefix.len() > best_prefix.len()) => {}
                _ => best = Some((group, prefix)),
            }
        }

        best.map(|(group, _)| group)
            .or(any_resource)
            .and_then(|group| select(group, method, headers))
    }
}

fn strip_context<'a>(request_uri: &'a str, context_path: &str) -> &'a str {
    let uri = if context_path.is_empty() {
        request_uri
    } else {
        request_uri.strip_prefix(context_path).unwrap_or(request_uri)
    };
    if uri.is_empty() {
        "/"
    } else {
        uri
    }
}

fn pattern_matches(pattern: &str, uri: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("/*.") {
        return uri
            .strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('.'));
    }

    if let Some(prefix) = pattern.strip_suffix("/*") {
        // `/` followed by the wildcard is the catch-all, never a prefix.
        if prefix.is_empty() {
            return false;
        }
        return uri
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
            || uri.trim_end_matches('/') == prefix;
    }

    if let Some(start) = pattern.find('{') {
        return uri.starts_with(&pattern[..start]);
    }

    false
}

/// The part of a pattern before its first wildcard or template segment.
fn literal_prefix(pattern: &str) -> &str {
    pattern
        .find(['*', '{'])
        .map_or(pattern, |end| &pattern[..end])
}

fn select<'a>(
    group: &'a [PathConfiguration],
    method: &Method,
    headers: &HeaderMap,
) -> Option<&'a PathConfiguration> {
    if group.len() == 1 {
        return group.first();
    }

    let eligible: Vec<&PathConfiguration> = group
        .iter()
        .filter(|path| path.is_method_allowed(method))
        .collect();

    if let Some(unconstrained) = eligible
        .iter()
        .copied()
        .find(|path| path.headers().is_empty())
    {
        return Some(unconstrained);
    }

    let mut best = None;
    let mut best_score = 0;
    for path in &eligible {
        let score = path
            .headers()
            .iter()
            .filter(|(name, value)| {
                headers
                    .get_all(name.as_str())
                    .iter()
                    .any(|actual| actual.to_str().is_ok_and(|actual| actual == value.as_str()))
            })
            .count();
        if score > best_score {
            best_score = score;
            best = Some(*path);
        }
    }

    best.or_else(|| eligible.first().copied())
        .or_else(|| group.first())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn path(uri: &str) -> PathConfiguration {
        PathConfiguration::builder(uri).build()
    }

    fn resolve<'a>(matcher: &'a PathMatcher, uri: &str) -> Option<&'a str> {
        matcher
            .match_path(uri, "", &Method::GET, &HeaderMap::new())
            .map(PathConfiguration::uri)
    }

    #[test]
    fn exact_beats_any_resource() {
        let matcher = PathMatcher::new([path("/*"), path("/admin")]);

        assert_eq!(resolve(&matcher, "/admin"), Some("/admin"));
        assert_eq!(resolve(&matcher, "/other"), Some("/*"));
    }

    #[test]
    fn suffix_patterns() {
        let matcher = PathMatcher::new([path("/*.jsp")]);

        assert_eq!(resolve(&matcher, "/foo/bar.jsp"), Some("/*.jsp"));
        assert_eq!(resolve(&matcher, "/foo/bar.html"), None);
        assert_eq!(resolve(&matcher, "/foo/barjsp"), None);
    }

    #[test]
    fn prefix_wildcard_matches_directory_itself() {
        let matcher = PathMatcher::new([path("/admin/*")]);

        assert_eq!(resolve(&matcher, "/admin/users"), Some("/admin/*"));
        assert_eq!(resolve(&matcher, "/admin/"), Some("/admin/*"));
        assert_eq!(resolve(&matcher, "/admin"), Some("/admin/*"));
        assert_eq!(resolve(&matcher, "/administrator"), None);
    }

    #[test]
    fn longer_prefix_wins_regardless_of_order() {
        let matcher = PathMatcher::new([path("/admin/*"), path("/admin/reports/*"), path("/*")]);
        assert_eq!(
            resolve(&matcher, "/admin/reports/2024"),
            Some("/admin/reports/*")
        );

        let matcher = PathMatcher::new([path("/admin/reports/*"), path("/admin/*")]);
        assert_eq!(
            resolve(&matcher, "/admin/reports/2024"),
            Some("/admin/reports/*")
        );
        assert_eq!(resolve(&matcher, "/admin/users"), Some("/admin/*"));
    }

    #[test]
    fn prefix_refines_suffix() {
        let matcher = PathMatcher::new([path("/*.jsp"), path("/secure/*")]);
        assert_eq!(resolve(&matcher, "/secure/page.jsp"), Some("/secure/*"));
    }

    #[test]
    fn template_matches_on_literal_prefix() {
        let matcher = PathMatcher::new([path("/users/{identity.account.id}/profile")]);

        assert_eq!(
            resolve(&matcher, "/users/42/profile"),
            Some("/users/{identity.account.id}/profile")
        );
        assert_eq!(resolve(&matcher, "/groups/42"), None);
    }

    #[test]
    fn context_path_is_ignored() {
        let matcher = PathMatcher::new([path("/admin/*"), path("/")]);

        let found = matcher.match_path("/app/admin/x", "/app", &Method::GET, &HeaderMap::new());
        assert_eq!(found.map(PathConfiguration::uri), Some("/admin/*"));

        let found = matcher.match_path("/app", "/app", &Method::GET, &HeaderMap::new());
        assert_eq!(found.map(PathConfiguration::uri), Some("/"));
    }

    #[test]
    fn method_selects_among_same_pattern() {
        let matcher = PathMatcher::new([
            PathConfiguration::builder("/api")
                .methods([Method::GET])
                .logout()
                .build(),
            PathConfiguration::builder("/api")
                .methods([Method::POST])
                .build(),
        ]);

        let post = matcher
            .match_path("/api", "", &Method::POST, &HeaderMap::new())
            .unwrap();
        assert!(post.is_method_allowed(&Method::POST));
        assert!(!post.is_logout());

        let get = matcher
            .match_path("/api", "", &Method::GET, &HeaderMap::new())
            .unwrap();
        assert!(get.is_logout());
    }

    #[test]
    fn unconstrained_entry_preferred_over_header_entries() {
        let matcher = PathMatcher::new([
            PathConfiguration::builder("/api")
                .header("X-Client", "mobile")
                .logout()
                .build(),
            PathConfiguration::builder("/api").build(),
        ]);

        let mut headers = HeaderMap::new();
        headers.insert("x-client", HeaderValue::from_static("mobile"));
        let found = matcher.match_path("/api", "", &Method::GET, &headers).unwrap();
        assert!(!found.is_logout());
    }

    #[test]
    fn header_score_picks_best_overlap() {
        let matcher = PathMatcher::new([
            PathConfiguration::builder("/api")
                .header("X-Client", "web")
                .build(),
            PathConfiguration::builder("/api")
                .header("X-Client", "mobile")
                .header("X-Version", "2")
                .logout()
                .build(),
        ]);

        let mut headers = HeaderMap::new();
        headers.insert("x-client", HeaderValue::from_static("mobile"));
        headers.insert("x-version", HeaderValue::from_static("2"));
        let found = matcher.match_path("/api", "", &Method::GET, &headers).unwrap();
        assert!(found.is_logout());

        // No overlap at all falls back to the first eligible entry.
        let found = matcher
            .match_path("/api", "", &Method::GET, &HeaderMap::new())
            .unwrap();
        assert!(!found.is_logout());
    }

    #[test]
    fn matching_is_repeatable() {
        let matcher = PathMatcher::new([path("/*"), path("/admin/*"), path("/*.css")]);

        let first = resolve(&matcher, "/admin/site.css");
        let second = resolve(&matcher, "/admin/site.css");
        assert_eq!(first, second);
        assert_eq!(first, Some("/admin/*"));
    }
}
