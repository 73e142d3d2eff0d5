//! Challenge/response negotiation driver

use crate::auth::mechanism::{Mechanism, Step};
use crate::error::Result;
use tracing::debug;

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NegotiationState {
    Started,
    AwaitingPeer,
    Complete,
}

/// Drives a mechanism session through the challenge/response exchange
///
/// The negotiator owns its mechanism session exclusively. It is not safe to
/// call concurrently; challenges must be evaluated in arrival order.
pub struct Negotiator {
    session: Box<dyn Mechanism>,
    state: NegotiationState,
}

impl Negotiator {
    pub(crate) fn new(session: Box<dyn Mechanism>) -> Self {
        debug!(mechanism = session.name(), "negotiation started");
        Self {
            session,
            state: NegotiationState::Started,
        }
    }

    /// Feed the peer's challenge to the mechanism and produce the response
    ///
    /// Returns the response bytes to send while more exchange is needed, or
    /// the final response once the mechanism reports success, after which
    /// [`is_complete`](Self::is_complete) returns true forever. Any other
    /// mechanism status surfaces as an authentication error and the session
    /// must be abandoned.
    pub fn evaluate_challenge(&mut self, challenge: &[u8]) -> Result<Vec<u8>> {
        match self.session.step(challenge)? {
            Step::Continue(response) => {
                self.state = NegotiationState::AwaitingPeer;
                Ok(response)
            }
            Step::Finished(response) => {
                debug!(mechanism = self.session.name(), "negotiation complete");
                self.state = NegotiationState::Complete;
                Ok(response)
            }
        }
    }

    /// Whether the mechanism has reported final success
    ///
    /// Pure read; never blocks, never mutates state.
    pub fn is_complete(&self) -> bool {
        self.state == NegotiationState::Complete
    }
}
