// Folds raw interface counters into the billing-cycle totals

use crate::state::{CycleState, RawSample};

/// Bytes to add to a running total given the previous and current counter.
///
/// A counter lower than the baseline means the interface or host restarted,
/// so everything the counter shows now was transferred after the restart.
fn counter_delta(last: u64, current: u64) -> u64 {
    if current < last {
        current
    } else {
        current - last
    }
}

/// Produce the next cycle state from the previous one and a fresh sample
pub fn accumulate(state: CycleState, sample: RawSample) -> CycleState {
    CycleState {
        total_received: state
            .total_received
            .saturating_add(counter_delta(state.last_received, sample.received)),
        total_transmitted: state
            .total_transmitted
            .saturating_add(counter_delta(state.last_transmitted, sample.transmitted)),
        last_received: sample.received,
        last_transmitted: sample.transmitted,
        ..state
    }
}
