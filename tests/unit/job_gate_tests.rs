//! Single-job admission gate.

use std::sync::Arc;

use session_worker::server::{GateState, JobGate};

#[test]
fn first_acquire_wins_and_later_ones_fail() {
    let gate = Arc::new(JobGate::new());
    assert_eq!(gate.state(), GateState::Idle);

    let permit = gate.try_acquire().expect("first job admitted");
    assert_eq!(gate.state(), GateState::Busy);
    assert!(gate.try_acquire().is_none());

    drop(permit);
    assert_eq!(gate.state(), GateState::Finished);
    assert!(gate.try_acquire().is_none(), "gate is single use");
}

#[test]
fn concurrent_acquires_admit_exactly_one() {
    let gate = Arc::new(JobGate::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || gate.try_acquire().map(std::mem::forget).is_some())
        })
        .collect();

    let admitted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(gate.state(), GateState::Busy);
}

#[test]
fn states_serialize_for_health_endpoint() {
    assert_eq!(serde_json::to_value(GateState::Finished).unwrap(), "finished");
}
