//! One-shot timers that decide when a fallback replaces suspended content.
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// The state of a [`TimeoutGate`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GateState {
    /// The duration has not elapsed yet.
    Pending,
    /// The duration has elapsed. This state is terminal.
    Expired,
}

/// The output of [`TimeoutGate::render`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Gated<C, F> {
    /// The wrapped content. It is kept after expiry so it stays mounted.
    pub content: C,
    /// Whether the content should be hidden.
    pub hidden: bool,
    /// The fallback, rendered alongside the hidden content once expired.
    pub fallback: Option<F>,
}

/// Raises an expiration flag once a fixed duration has elapsed since mount.
///
/// Each gate owns exactly one timer task, which is aborted when the gate is dropped.
/// The flag flips from `false` to `true` at most once.
#[derive(Debug)]
pub struct TimeoutGate {
    duration: Duration,
    mounted_at: Instant,
    expired: watch::Receiver<bool>,
    timer: AbortHandle,
}

impl TimeoutGate {
    /// Mounts a gate and starts its timer.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn mount(duration: Duration) -> Self {
        let mounted_at = Instant::now();
        let deadline = mounted_at + duration;
        let (sender, expired) = watch::channel(false);

        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let flipped = sender.send_if_modified(|expired| !std::mem::replace(expired, true));
            if flipped {
                metric!(counter("gate.expired") += 1);
                tracing::debug!(?duration, "timeout gate expired");
            }
        });

        TimeoutGate {
            duration,
            mounted_at,
            expired,
            timer: timer.abort_handle(),
        }
    }

    /// The duration this gate was mounted with.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn state(&self) -> GateState {
        if self.is_expired() {
            GateState::Expired
        } else {
            GateState::Pending
        }
    }

    /// Returns the current value of the expiration flag.
    pub fn is_expired(&self) -> bool {
        *self.expired.borrow()
    }

    /// Time left until the gate expires, zero once the deadline has passed.
    pub fn remaining(&self) -> Duration {
        (self.mounted_at + self.duration).saturating_duration_since(Instant::now())
    }

    /// Returns a receiver observing the expiration flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.expired.clone()
    }

    /// Resolves once the gate has expired.
    pub async fn wait_expired(&self) {
        let mut expired = self.expired.clone();
        if expired.wait_for(|expired| *expired).await.is_err() {
            // the timer is gone without firing, which only happens on runtime shutdown
            futures::future::pending::<()>().await;
        }
    }

    /// Renders `children` with the current expiration flag.
    ///
    /// While pending, the content is visible and there is no fallback. Once expired,
    /// the content is still rendered but hidden, and the fallback is added next to it.
    pub fn render<C, F>(
        &self,
        children: impl FnOnce(bool) -> C,
        fallback: impl FnOnce() -> F,
    ) -> Gated<C, F> {
        let expired = self.is_expired();
        Gated {
            content: children(expired),
            hidden: expired,
            fallback: expired.then(fallback),
        }
    }
}

impl Drop for TimeoutGate {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn advance(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_renders_fallback_after_expiry() {
        suspensor_test::setup();
        let gate = TimeoutGate::mount(Duration::from_millis(1000));

        advance(999).await;
        let gated = gate.render(|expired| format!("children({expired})"), || "spinner");
        assert_eq!(gated.content, "children(false)");
        assert!(!gated.hidden);
        assert_eq!(gated.fallback, None);

        advance(2).await;
        let gated = gate.render(|expired| format!("children({expired})"), || "spinner");
        assert_eq!(gated.content, "children(true)");
        assert!(gated.hidden);
        assert_eq!(gated.fallback, Some("spinner"));
        assert_eq!(gate.state(), GateState::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flips_exactly_once() {
        let gate = TimeoutGate::mount(Duration::from_millis(100));
        let mut expired = gate.subscribe();
        assert!(!*expired.borrow_and_update());

        expired.changed().await.unwrap();
        assert!(*expired.borrow_and_update());
        assert!(gate.remaining().is_zero());

        advance(10_000).await;
        // the timer is done, so nothing can change the flag anymore
        assert!(!expired.has_changed().unwrap_or(false));
        assert!(*expired.borrow());
        assert!(gate.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_expired() {
        let gate = TimeoutGate::mount(Duration::from_millis(250));
        let start = Instant::now();
        gate.wait_expired().await;
        assert_eq!(start.elapsed(), Duration::from_millis(250));
        assert!(gate.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_cancels_timer() {
        let gate = TimeoutGate::mount(Duration::from_millis(100));
        let expired = gate.subscribe();
        drop(gate);

        advance(200).await;
        assert!(!*expired.borrow());
        assert!(expired.has_changed().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration() {
        let gate = TimeoutGate::mount(Duration::ZERO);
        tokio::task::yield_now().await;
        gate.wait_expired().await;
        assert_eq!(gate.state(), GateState::Expired);
    }
}
