//! The render loop that drives suspending render passes.
//!
//! A render pass is a plain function returning `Result<T, Suspension>`. When it
//! suspends, the host awaits the [`Suspension`] and runs the pass again. Nothing from a
//! suspended pass is kept, so it is fine to abandon a pass at any point.
//!
//! [`AsyncRouteProvider`] combines this with a [`TimeoutGate`] per navigation. Each
//! completed pass produces a [`Frame`]: what would be on screen after that pass.
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::caching::{FetchError, Suspension};
use crate::routing::{AsyncRoute, Rendered};
use crate::timeout::TimeoutGate;

/// Runs `pass` until it completes, awaiting every suspension in between.
///
/// Returns the error of the first suspension that settles unsuccessfully.
pub async fn render_to_completion<T, F>(mut pass: F) -> Result<T, FetchError>
where
    F: FnMut() -> Result<T, Suspension>,
{
    loop {
        match pass() {
            Ok(output) => return Ok(output),
            Err(suspension) => {
                metric!(counter("render.suspended") += 1, "resource" => suspension.resource());
                tracing::debug!(resource = suspension.resource(), "render suspended");
                suspension.await?;
            }
        }
    }
}

/// The content of one route in a [`Frame`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RouteOutput<T> {
    /// The path of the route that rendered the content.
    pub path: String,
    pub content: T,
}

/// The visible result of a completed render pass.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Frame<T> {
    /// The location being navigated to.
    pub location: String,
    /// Whether `content` is hidden behind the fallback.
    pub hidden: bool,
    /// Content of every route that rendered something, in route order.
    pub content: Vec<RouteOutput<T>>,
    /// The fallback, present once the gate has expired.
    pub fallback: Option<T>,
}

impl<T: fmt::Display> fmt::Display for Frame<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)?;
        if self.hidden {
            write!(f, " [hidden]")?;
        }
        for output in &self.content {
            write!(f, " {}={}", output.path, output.content)?;
        }
        if let Some(fallback) = &self.fallback {
            write!(f, " fallback={fallback}")?;
        }
        Ok(())
    }
}

/// Renders a list of [`AsyncRoute`]s under a timeout gate.
///
/// Every navigation mounts a gate. While the new location suspends, the previous
/// content stays on screen. If the gate expires first, the outgoing route keeps its
/// content mounted but hidden, and the fallback is shown. Once the suspension settles,
/// a fresh gate is mounted and the pass is retried.
#[derive(Debug)]
pub struct AsyncRouteProvider<T> {
    timeout: Duration,
    fallback: T,
    routes: Vec<AsyncRoute<T>>,
    last_content: Vec<RouteOutput<T>>,
}

impl<T: Clone> AsyncRouteProvider<T> {
    pub fn new(timeout: Duration, fallback: T) -> Self {
        Self {
            timeout,
            fallback,
            routes: Vec::new(),
            last_content: Vec::new(),
        }
    }

    pub fn with_route(mut self, route: AsyncRoute<T>) -> Self {
        self.routes.push(route);
        self
    }

    pub fn routes(&self) -> &[AsyncRoute<T>] {
        &self.routes
    }

    /// Navigates to `location` and renders until the content of the location is shown.
    ///
    /// Returns every frame committed on the way, the last of which is never hidden.
    #[tracing::instrument(skip(self), fields(timeout = ?self.timeout))]
    pub async fn navigate(&mut self, location: &str) -> Result<Vec<Frame<T>>, FetchError> {
        metric!(counter("navigation") += 1);
        let mut frames = Vec::new();
        let mut gate = TimeoutGate::mount(self.timeout);
        // whether this navigation has seen the current gate expire
        let mut expired = false;

        loop {
            let mut suspension = match self.pass(location, expired, &mut frames) {
                Pass::Shown => return Ok(frames),
                Pass::Suspended(suspension) => suspension,
                Pass::Hidden => {
                    gate = TimeoutGate::mount(self.timeout);
                    expired = false;
                    continue;
                }
            };

            if expired {
                // the fallback is on screen, so only the data can move us forward
                suspension.await?;
                tracing::debug!("remounting timeout gate");
                gate = TimeoutGate::mount(self.timeout);
                expired = false;
                continue;
            }

            tokio::select! {
                biased;

                settled = &mut suspension => settled?,

                () = gate.wait_expired() => {
                    tracing::debug!("timeout gate expired, showing fallback");
                    expired = true;
                }
            }
        }
    }

    /// Runs one render pass and commits it if it completes.
    ///
    /// A frame is recorded for every completed pass. A suspended pass only records a
    /// frame if it ran with the gate expired, showing the previous content behind the
    /// fallback.
    fn pass(&mut self, location: &str, expired: bool, frames: &mut Vec<Frame<T>>) -> Pass {
        let rendered: Result<Vec<Rendered<T>>, Suspension> = self
            .routes
            .iter()
            .map(|route| route.render(location, expired))
            .collect();

        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(suspension) => {
                metric!(counter("render.suspended") += 1, "resource" => suspension.resource());
                tracing::debug!(resource = suspension.resource(), expired, "render suspended");
                if expired {
                    let content = self.last_content.clone();
                    frames.push(self.frame(location, expired, content));
                }
                return Pass::Suspended(suspension);
            }
        };

        let mut content = Vec::new();
        for (route, rendered) in self.routes.iter_mut().zip(rendered) {
            route.commit(&rendered);
            if let Some(output) = rendered.content {
                content.push(RouteOutput {
                    path: route.route().path().to_owned(),
                    content: output,
                });
            }
        }
        metric!(counter("render.commit") += 1);

        self.last_content = content.clone();
        frames.push(self.frame(location, expired, content));

        if expired { Pass::Hidden } else { Pass::Shown }
    }

    fn frame(&self, location: &str, expired: bool, content: Vec<RouteOutput<T>>) -> Frame<T> {
        Frame {
            location: location.to_owned(),
            hidden: expired,
            content,
            fallback: expired.then(|| self.fallback.clone()),
        }
    }
}

/// The outcome of [`AsyncRouteProvider::pass`].
enum Pass {
    /// The pass completed and its content is visible.
    Shown,
    /// The pass completed after the gate expired, so its content is hidden.
    Hidden,
    /// The pass suspended.
    Suspended(Suspension),
}
