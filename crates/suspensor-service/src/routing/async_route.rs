use std::fmt;

use crate::caching::Suspension;

use super::transition::{Snapshot, TransitionState, next_state, should_render};
use super::{Route, RouteMatch};

/// Renders the content of a route. Returning `Err` suspends the render pass.
pub type RenderFn<T> = Box<dyn Fn(&RouteProps) -> Result<T, Suspension> + Send + Sync>;

/// What a render function gets to see.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteProps {
    /// The location being rendered.
    pub location: String,
    /// The match of the route against `location`, if any.
    pub matched: Option<RouteMatch>,
    /// Whether the timeout gate of the current navigation has expired.
    pub expired: bool,
}

/// The `children` of an [`AsyncRoute`].
pub enum Children<T> {
    /// Content that is cloned as-is.
    Element(T),
    /// Content computed from the route props.
    Render(RenderFn<T>),
}

impl<T> fmt::Debug for Children<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Children::Element(_) => f.write_str("Element(..)"),
            Children::Render(_) => f.write_str("Render(..)"),
        }
    }
}

/// The result of a render pass over one [`AsyncRoute`], before it is committed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rendered<T> {
    /// The inputs of this render.
    pub snapshot: Snapshot,
    /// The transition state this render was decided with.
    pub state: TransitionState,
    /// The content, or `None` if the route renders nothing.
    pub content: Option<T>,
}

/// A route that holds on to its content while a navigation away from it is suspended.
///
/// Rendering is split in two steps. [`AsyncRoute::render`] computes what the route
/// would show without changing anything, so a pass that suspends halfway leaves every
/// route untouched. [`AsyncRoute::commit`] then applies the transition of a completed
/// pass.
pub struct AsyncRoute<T> {
    route: Route,
    children: Option<Children<T>>,
    render: Option<RenderFn<T>>,
    state: TransitionState,
    prev: Option<Snapshot>,
}

impl<T> fmt::Debug for AsyncRoute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRoute")
            .field("route", &self.route)
            .field("children", &self.children)
            .field("render", &self.render.is_some())
            .field("state", &self.state)
            .field("prev", &self.prev)
            .finish()
    }
}

impl<T: Clone> AsyncRoute<T> {
    pub fn new(route: Route) -> Self {
        Self {
            route,
            children: None,
            render: None,
            state: TransitionState::Steady,
            prev: None,
        }
    }

    /// Shows `element` whenever the route renders.
    pub fn with_element(mut self, element: T) -> Self {
        self.children = Some(Children::Element(element));
        self
    }

    /// Computes the content from the route props. Takes precedence over `with_render`.
    pub fn with_children<F>(mut self, children: F) -> Self
    where
        F: Fn(&RouteProps) -> Result<T, Suspension> + Send + Sync + 'static,
    {
        self.children = Some(Children::Render(Box::new(children)));
        self
    }

    /// Computes the content from the route props, used when there are no children.
    pub fn with_render<F>(mut self, render: F) -> Self
    where
        F: Fn(&RouteProps) -> Result<T, Suspension> + Send + Sync + 'static,
    {
        self.render = Some(Box::new(render));
        self
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// The transition state of the last committed render.
    pub fn state(&self) -> TransitionState {
        self.state
    }

    /// Renders the route for `location` without committing anything.
    ///
    /// The first render of a route never transitions. Afterwards, the state is derived
    /// from the last committed render with [`next_state`].
    pub fn render(&self, location: &str, expired: bool) -> Result<Rendered<T>, Suspension> {
        let matched = self.route.matches(location);
        let snapshot = Snapshot::new(matched.is_some(), expired);
        let state = match self.prev {
            Some(prev) => next_state(self.state, prev, snapshot),
            None => self.state,
        };

        let content = if should_render(snapshot.matched, state, expired) {
            let props = RouteProps {
                location: location.to_owned(),
                matched,
                expired,
            };
            self.content(&props)?
        } else {
            None
        };

        Ok(Rendered {
            snapshot,
            state,
            content,
        })
    }

    fn content(&self, props: &RouteProps) -> Result<Option<T>, Suspension> {
        match (&self.children, &self.render) {
            (Some(Children::Element(element)), _) => Ok(Some(element.clone())),
            (Some(Children::Render(children)), _) => children(props).map(Some),
            (None, Some(render)) => render(props).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Applies the transition of a completed render pass.
    pub fn commit(&mut self, rendered: &Rendered<T>) {
        if rendered.state != self.state {
            tracing::debug!(
                route = self.route.path(),
                from = ?self.state,
                to = ?rendered.state,
                "route transition",
            );
        }
        self.state = rendered.state;
        self.prev = Some(rendered.snapshot);
    }
}
