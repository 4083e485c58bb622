//! State machine traits.

use crate::{Action, Event};
use std::time::Duration;

/// A deterministic, synchronous state machine.
///
/// The runner sets the clock before delivering each event; handlers never
/// read wall-clock time themselves.
pub trait StateMachine {
    /// Process one event to completion, returning the actions it produced.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Update the machine's notion of "now".
    fn set_time(&mut self, now: Duration);

    /// The machine's current notion of "now".
    fn now(&self) -> Duration;
}
