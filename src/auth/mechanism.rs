//! Mechanism seam between the negotiator and concrete authentication code

use crate::error::Result;

/// Outcome of a single mechanism step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Mechanism needs more data from the peer; send these bytes (possibly
    /// empty) and wait for the next challenge
    Continue(Vec<u8>),
    /// Mechanism reported final success; send these bytes (possibly empty)
    Finished(Vec<u8>),
}

/// A single-threaded, sequential authentication mechanism session
///
/// Implementations are strict state machines: `step` must be fed challenges
/// exactly in the order they arrive from the peer. After an error the
/// session must be abandoned.
pub trait Mechanism: Send {
    /// Mechanism name as advertised on the wire
    fn name(&self) -> &'static str;

    /// Feed one peer challenge and produce the next response
    fn step(&mut self, challenge: &[u8]) -> Result<Step>;
}
