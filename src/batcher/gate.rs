//! Batching gate: the decision taken after every submission.

/// Whether a batch is currently in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// No batch in flight
    #[default]
    Idle,
    /// A batch has been taken from the queue and is not yet fully settled
    Dispatching,
}

/// Action chosen by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Take a batch from the queue now
    DispatchNow,
    /// Arm the batch frequency timer
    ArmTimer,
    /// A timer is armed or a dispatch will pick the backlog up
    Wait,
}

/// Decide what a submission should trigger
///
/// Size-based dispatch only happens while idle. During a dispatch a full
/// queue falls through to the timer, so the backlog is still flushed if the
/// drain loop has already stopped.
pub fn decide(phase: Phase, queue_len: usize, batch_size: usize, timer_armed: bool) -> GateDecision {
    if phase == Phase::Idle && queue_len >= batch_size {
        GateDecision::DispatchNow
    } else if !timer_armed {
        GateDecision::ArmTimer
    } else {
        GateDecision::Wait
    }
}

/// Whether a firing timer should start a dispatch
///
/// A timer that fires while a batch is in flight leaves the backlog to the
/// drain loop, keeping at most one dispatch in flight.
pub fn timer_should_dispatch(phase: Phase, queue_len: usize) -> bool {
    phase == Phase::Idle && queue_len > 0
}
