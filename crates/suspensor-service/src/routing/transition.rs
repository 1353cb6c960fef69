use thiserror::Error;

/// Where a route instance stands in a navigation.
///
/// Being both incoming and outgoing is not representable. Raw flag pairs coming from
/// elsewhere go through [`TransitionState::from_flags`], which rejects that combination.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum TransitionState {
    /// Not transitioning. Shown if matched and the gate has not expired.
    #[default]
    Steady,
    /// Became matched while the expiration flag changed.
    Incoming,
    /// Stopped being matched while the expiration flag changed.
    Outgoing,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum TransitionError {
    #[error("route transition is both incoming and outgoing")]
    Ambiguous,
}

impl TransitionState {
    /// Builds a state from `incoming`/`outgoing` flags.
    pub fn from_flags(incoming: bool, outgoing: bool) -> Result<Self, TransitionError> {
        match (incoming, outgoing) {
            (false, false) => Ok(Self::Steady),
            (true, false) => Ok(Self::Incoming),
            (false, true) => Ok(Self::Outgoing),
            (true, true) => Err(TransitionError::Ambiguous),
        }
    }

    pub fn is_incoming(self) -> bool {
        self == Self::Incoming
    }

    pub fn is_outgoing(self) -> bool {
        self == Self::Outgoing
    }
}

/// The inputs of one committed render of a route.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Snapshot {
    pub matched: bool,
    pub expired: bool,
}

impl Snapshot {
    pub fn new(matched: bool, expired: bool) -> Self {
        Self { matched, expired }
    }
}

/// Computes the transition state after a render with `curr`, given the state and
/// inputs of the previous render.
///
/// Nothing changes unless the expiration flag changed. When it did, a route that just
/// became matched is incoming, one that just stopped being matched is outgoing, and
/// any other route settles.
pub fn next_state(state: TransitionState, prev: Snapshot, curr: Snapshot) -> TransitionState {
    if curr.expired == prev.expired {
        return state;
    }

    match (prev.matched, curr.matched) {
        (false, true) => TransitionState::Incoming,
        (true, false) => TransitionState::Outgoing,
        _ => TransitionState::Steady,
    }
}

/// Decides whether a route renders its content.
///
/// Incoming content shows until the gate expires. Outgoing content shows only once it
/// has. A steady route shows while it is matched and the gate has not expired.
pub fn should_render(matched: bool, state: TransitionState, expired: bool) -> bool {
    match state {
        TransitionState::Steady => matched && !expired,
        TransitionState::Incoming => !expired,
        TransitionState::Outgoing => expired,
    }
}
