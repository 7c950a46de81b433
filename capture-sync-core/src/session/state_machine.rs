use std::sync::atomic::{AtomicU8, Ordering};

use crate::models::error::CaptureError;
use crate::models::state::CaptureState;

/// Lock-free holder of a session's `CaptureState`.
///
/// Every transition is checked against [`CaptureState::can_transition_to`]
/// and published with a compare-exchange, so two threads racing to move out
/// of the same state cannot both succeed. Observers see the state with
/// acquire ordering, which pairs with the release on publish.
#[derive(Debug)]
pub struct SessionStateMachine {
    state: AtomicU8,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CaptureState::Created as u8),
        }
    }

    pub fn current(&self) -> CaptureState {
        CaptureState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the table allows moving from the current state to `target`.
    /// Does not change anything.
    pub fn can_transition_to(&self, target: CaptureState) -> bool {
        self.current().can_transition_to(target)
    }

    /// Move to `target` if legal. False for an illegal transition or when
    /// another thread changed the state first; the state is left untouched.
    pub fn try_transition_to(&self, target: CaptureState) -> bool {
        let current = self.state.load(Ordering::Acquire);
        let from = CaptureState::from_u8(current);
        if !from.can_transition_to(target) {
            log::debug!("Rejected state transition {:?} -> {:?}", from, target);
            return false;
        }
        match self
            .state
            .compare_exchange(current, target as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                log::debug!("State {:?} -> {:?}", from, target);
                true
            }
            Err(actual) => {
                log::debug!(
                    "Lost state transition race {:?} -> {:?} (now {:?})",
                    from,
                    target,
                    CaptureState::from_u8(actual)
                );
                false
            }
        }
    }

    /// Like `try_transition_to`, with the observed state in the error.
    pub fn transition_or_err(&self, target: CaptureState) -> Result<CaptureState, CaptureError> {
        let from = self.current();
        if self.try_transition_to(target) {
            Ok(from)
        } else {
            Err(CaptureError::InvalidTransition {
                from: self.current(),
                to: target,
            })
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.current().is_terminal()
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn machine_in(state: CaptureState) -> SessionStateMachine {
        let machine = SessionStateMachine::new();
        machine.state.store(state as u8, Ordering::Release);
        machine
    }

    #[test]
    fn starts_created() {
        let machine = SessionStateMachine::new();
        assert_eq!(machine.current(), CaptureState::Created);
        assert!(!machine.is_terminal());
    }

    #[test]
    fn happy_path() {
        let machine = SessionStateMachine::new();
        assert!(machine.try_transition_to(CaptureState::Initialized));
        assert!(machine.try_transition_to(CaptureState::Active));
        assert!(machine.try_transition_to(CaptureState::Paused));
        assert!(machine.try_transition_to(CaptureState::Active));
        assert!(machine.try_transition_to(CaptureState::Stopped));
        assert!(machine.is_terminal());
    }

    #[test]
    fn every_pair_follows_the_table() {
        for from in CaptureState::all() {
            for to in CaptureState::all() {
                let machine = machine_in(from);
                let allowed = from.can_transition_to(to);
                assert_eq!(machine.can_transition_to(to), allowed, "{:?} -> {:?}", from, to);
                assert_eq!(machine.try_transition_to(to), allowed, "{:?} -> {:?}", from, to);
                let expected = if allowed { to } else { from };
                assert_eq!(machine.current(), expected);
            }
        }
    }

    #[test]
    fn terminal_states_reject_everything() {
        for terminal in [CaptureState::Stopped, CaptureState::Failed] {
            let machine = machine_in(terminal);
            for to in CaptureState::all() {
                assert!(!machine.try_transition_to(to));
            }
            assert_eq!(machine.current(), terminal);
        }
    }

    #[test]
    fn skipping_initialize_is_rejected() {
        let machine = SessionStateMachine::new();
        assert!(!machine.try_transition_to(CaptureState::Active));
        assert_eq!(machine.current(), CaptureState::Created);
    }

    #[test]
    fn transition_or_err_reports_states() {
        let machine = SessionStateMachine::new();
        assert_eq!(
            machine.transition_or_err(CaptureState::Initialized),
            Ok(CaptureState::Created)
        );
        assert_eq!(
            machine.transition_or_err(CaptureState::Paused),
            Err(CaptureError::InvalidTransition {
                from: CaptureState::Initialized,
                to: CaptureState::Paused,
            })
        );
    }

    #[test]
    fn exactly_one_racer_wins() {
        for _ in 0..50 {
            let machine = Arc::new(machine_in(CaptureState::Active));
            let barrier = Arc::new(Barrier::new(2));
            let wins = Arc::new(AtomicUsize::new(0));

            let handles: Vec<_> = [CaptureState::Stopped, CaptureState::Failed]
                .into_iter()
                .map(|target| {
                    let machine = Arc::clone(&machine);
                    let barrier = Arc::clone(&barrier);
                    let wins = Arc::clone(&wins);
                    thread::spawn(move || {
                        barrier.wait();
                        if machine.try_transition_to(target) {
                            wins.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            assert_eq!(wins.load(Ordering::SeqCst), 1);
            assert!(machine.is_terminal());
        }
    }
}
