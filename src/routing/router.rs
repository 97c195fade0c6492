//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes with their merged filter settings
//! - Look up matching route for request
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Explicit NoMatch rather than silent default

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::uri::Authority;
use axum::http::Request;

use crate::config::{RouteConfig, ServerConfig};
use crate::filter::FilterSettings;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};

/// Where a matched request is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Files under this directory, with the route prefix stripped.
    Static(PathBuf),
    /// Proxied to this upstream with the original URI.
    Upstream(Authority),
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub priority: u32,
    pub target: RouteTarget,
    pub settings: Arc<FilterSettings>,
    prefix: Option<PathPrefixMatcher>,
    matcher: AndMatcher,
}

impl Route {
    /// Compile a route. Returns `None` for routes without a usable target,
    /// which validation rejects anyway.
    pub fn compile(config: &RouteConfig, parent: &crate::config::FilterConfig) -> Option<Self> {
        let target = match (&config.root, &config.upstream) {
            (Some(root), None) => RouteTarget::Static(root.clone()),
            (None, Some(upstream)) => RouteTarget::Upstream(upstream.parse().ok()?),
            _ => return None,
        };

        let prefix = config.path_prefix.as_deref().map(PathPrefixMatcher::new);
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.clone())));
        }
        if let Some(prefix) = &prefix {
            matchers.push(Box::new(prefix.clone()));
        }

        Some(Self {
            name: config.name.clone(),
            priority: config.priority,
            target,
            settings: Arc::new(config.filter_settings(parent)),
            prefix,
            matcher: AndMatcher::new(matchers),
        })
    }

    pub fn matches(&self, req: &Request<Body>) -> bool {
        self.matcher.matches(req)
    }

    /// Path relative to the route prefix, always starting with `/`.
    pub fn strip_prefix<'a>(&self, path: &'a str) -> &'a str {
        let rest = match &self.prefix {
            Some(prefix) if prefix.prefix() != "/" => {
                path.strip_prefix(prefix.prefix()).unwrap_or(path)
            }
            _ => path,
        };
        if rest.is_empty() {
            "/"
        } else {
            rest
        }
    }
}

/// Immutable set of routes, highest priority first.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    defaults: Arc<FilterSettings>,
}

impl RouteTable {
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut routes: Vec<Arc<Route>> = config
            .routes
            .iter()
            .filter_map(|route| {
                let compiled = Route::compile(route, &config.filter);
                if compiled.is_none() {
                    tracing::warn!(route = %route.name, "Skipping route without a usable target");
                }
                compiled.map(Arc::new)
            })
            .collect();
        // Stable sort keeps config order among equal priorities.
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        Self {
            routes,
            defaults: Arc::new(config.filter.settings()),
        }
    }

    /// First route matching the request, by priority.
    pub fn match_request(&self, req: &Request<Body>) -> Option<Arc<Route>> {
        self.routes.iter().find(|r| r.matches(req)).cloned()
    }

    /// Filter settings for requests that match no route.
    pub fn defaults(&self) -> Arc<FilterSettings> {
        self.defaults.clone()
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        let config: ServerConfig = toml::from_str(
            r#"
            [filter]
            guess_mime = true

            [[routes]]
            name = "catch-all"
            path_prefix = "/"
            root = "/srv/www"
            guess_mime = false

            [[routes]]
            name = "uploads"
            path_prefix = "/uploads"
            root = "/srv/uploads"
            priority = 10

            [[routes]]
            name = "blobs"
            host = "blobs.example.com"
            upstream = "127.0.0.1:9000"
            priority = 20
            "#,
        )
        .unwrap();
        RouteTable::from_config(&config)
    }

    fn request(host: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("Host", host)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_priority_order() {
        let table = table();
        let names: Vec<_> = table.routes().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["blobs", "uploads", "catch-all"]);
    }

    #[test]
    fn test_match_request() {
        let table = table();

        let route = table.match_request(&request("www.example.com", "/uploads/x")).unwrap();
        assert_eq!(route.name, "uploads");
        assert!(route.settings.guess_mime);
        assert_eq!(route.strip_prefix("/uploads/x"), "/x");
        assert_eq!(route.strip_prefix("/uploads"), "/");

        let route = table.match_request(&request("www.example.com", "/index.html")).unwrap();
        assert_eq!(route.name, "catch-all");
        assert!(!route.settings.guess_mime);
        assert_eq!(route.strip_prefix("/index.html"), "/index.html");

        let route = table.match_request(&request("blobs.example.com", "/uploads/x")).unwrap();
        assert_eq!(route.name, "blobs");
        assert_eq!(
            route.target,
            RouteTarget::Upstream(Authority::from_static("127.0.0.1:9000"))
        );
    }

    #[test]
    fn test_no_match_uses_defaults() {
        let table = RouteTable::from_config(&ServerConfig::default());
        assert!(table.is_empty());
        assert!(table.match_request(&request("a", "/")).is_none());
        assert!(!table.defaults().guess_mime);
    }
}
