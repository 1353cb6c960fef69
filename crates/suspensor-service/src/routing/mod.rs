//! # Routes and route transitions
//!
//! A [`Route`] decides whether it matches a location. An [`AsyncRoute`] adds content
//! and the transition state machine from [`transition`]: on every committed render it
//! compares the current `(matched, expired)` pair against the previous one and decides
//! whether its content is shown.
//!
//! Matching follows the usual prefix rules. A non-exact route matches a location if its
//! path is a prefix of the location on a segment boundary, so `/` matches everything
//! and `/about` matches `/about/team` but not `/aboutus`. An exact route only matches
//! its own path. Trailing slashes, query strings and fragments are ignored.

use serde::Serialize;

mod async_route;
pub mod transition;

pub use async_route::{AsyncRoute, Children, RenderFn, Rendered, RouteProps};
pub use transition::{Snapshot, TransitionError, TransitionState, next_state, should_render};

/// The result of matching a [`Route`] against a location.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RouteMatch {
    /// The path pattern of the route.
    pub path: String,
    /// The part of the location that was matched.
    pub url: String,
    /// Whether the whole location was matched.
    pub is_exact: bool,
}

/// A path pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    path: String,
    exact: bool,
}

impl Route {
    /// A route that matches its path and everything below it.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: normalize(&path.into()).to_owned(),
            exact: false,
        }
    }

    /// A route that only matches its own path.
    pub fn exact(path: impl Into<String>) -> Self {
        Self {
            exact: true,
            ..Self::new(path)
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// Matches this route against `location`.
    pub fn matches(&self, location: &str) -> Option<RouteMatch> {
        let location = normalize(location);

        let url = if self.path == "/" {
            "/"
        } else {
            let rest = location.strip_prefix(self.path.as_str())?;
            if !rest.is_empty() && !rest.starts_with('/') {
                return None;
            }
            &location[..self.path.len()]
        };

        let is_exact = url == location;
        if self.exact && !is_exact {
            return None;
        }

        Some(RouteMatch {
            path: self.path.clone(),
            url: url.to_owned(),
            is_exact,
        })
    }
}

/// Strips the query, fragment and trailing slashes of a location.
fn normalize(location: &str) -> &str {
    let end = location.find(['?', '#']).unwrap_or(location.len());
    let path = location[..end].trim_end_matches('/');
    if path.is_empty() { "/" } else { path }
}
