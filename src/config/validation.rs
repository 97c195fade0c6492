//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every route has exactly one target (static root or upstream)
//! - Validate MIME types in defaults and type overrides
//! - Validate value ranges (timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use mime_guess::mime::Mime;
use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener bind address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("route #{0} has an empty name")]
    EmptyRouteName(usize),

    #[error("route `{0}` is defined more than once")]
    DuplicateRoute(String),

    #[error("route `{route}`: path_prefix `{prefix}` must start with `/`")]
    PathPrefix { route: String, prefix: String },

    #[error("route `{0}` must set exactly one of `root` or `upstream`")]
    RouteTarget(String),

    #[error("route `{route}`: upstream `{upstream}` is not a host:port address")]
    Upstream { route: String, upstream: String },

    #[error("{scope}: `{value}` is not a valid media type")]
    MediaType { scope: String, value: String },

    #[error("timeouts.request_secs must be greater than zero")]
    RequestTimeout,
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    check_media_type(&mut errors, "filter.default_type", &config.filter.default_type);
    for (ext, mime) in &config.types {
        check_media_type(&mut errors, &format!("types.{ext}"), mime);
    }

    let mut names = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if route.name.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteName(i));
        } else if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }

        if let Some(prefix) = &route.path_prefix {
            if !prefix.starts_with('/') {
                errors.push(ValidationError::PathPrefix {
                    route: route.name.clone(),
                    prefix: prefix.clone(),
                });
            }
        }

        match (&route.root, &route.upstream) {
            (Some(_), None) => {}
            (None, Some(upstream)) => {
                if upstream.parse::<axum::http::uri::Authority>().is_err() || !upstream.contains(':') {
                    errors.push(ValidationError::Upstream {
                        route: route.name.clone(),
                        upstream: upstream.clone(),
                    });
                }
            }
            _ => errors.push(ValidationError::RouteTarget(route.name.clone())),
        }

        if let Some(default_type) = &route.default_type {
            check_media_type(
                &mut errors,
                &format!("routes.{}.default_type", route.name),
                default_type,
            );
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::RequestTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_media_type(errors: &mut Vec<ValidationError>, scope: &str, value: &str) {
    if value.parse::<Mime>().is_err() {
        errors.push(ValidationError::MediaType {
            scope: scope.to_string(),
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    fn static_route(name: &str, prefix: &str) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            path_prefix: Some(prefix.into()),
            root: Some("/srv/files".into()),
            ..RouteConfig::default()
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_all_errors() {
        let mut config = ServerConfig::default();
        config.filter.default_type = "not a type".into();
        config.types.insert("js".into(), "javascript".into());
        config.routes.push(static_route("files", "files"));
        config.routes.push(static_route("files", "/files"));
        config.routes.push(RouteConfig {
            name: "both".into(),
            root: Some("/srv".into()),
            upstream: Some("127.0.0.1:9000".into()),
            ..RouteConfig::default()
        });
        config.routes.push(RouteConfig {
            name: "bad-upstream".into(),
            upstream: Some("no port here".into()),
            ..RouteConfig::default()
        });
        config.timeouts.request_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::MediaType {
            scope: "filter.default_type".into(),
            value: "not a type".into(),
        }));
        assert!(errors.contains(&ValidationError::MediaType {
            scope: "types.js".into(),
            value: "javascript".into(),
        }));
        assert!(errors.contains(&ValidationError::PathPrefix {
            route: "files".into(),
            prefix: "files".into(),
        }));
        assert!(errors.contains(&ValidationError::DuplicateRoute("files".into())));
        assert!(errors.contains(&ValidationError::RouteTarget("both".into())));
        assert!(errors.contains(&ValidationError::Upstream {
            route: "bad-upstream".into(),
            upstream: "no port here".into(),
        }));
        assert!(errors.contains(&ValidationError::RequestTimeout));
    }

    #[test]
    fn test_upstream_route_is_valid() {
        let mut config = ServerConfig::default();
        config.routes.push(RouteConfig {
            name: "blobs".into(),
            path_prefix: Some("/blobs".into()),
            upstream: Some("127.0.0.1:9000".into()),
            guess_mime: Some(true),
            default_type: Some("text/plain".into()),
            ..RouteConfig::default()
        });
        assert!(validate_config(&config).is_ok());
    }
}
