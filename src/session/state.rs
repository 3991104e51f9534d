//! Handler lock state machine.

/// Whether a handler currently holds its session lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandlerState {
    /// No lock held; the next `read` has to acquire one.
    #[default]
    Unlocked,
    /// The session lock is held by this handler.
    Locked,
}

impl HandlerState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Unlocked -> Locked (lock acquired by `read`)
    /// - Locked -> Unlocked (lock released by `close` or `destroy`)
    pub fn can_transition_to(&self, target: HandlerState) -> bool {
        use HandlerState::*;
        matches!((*self, target), (Unlocked, Locked) | (Locked, Unlocked))
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: HandlerState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::SessionLockError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, HandlerState::Locked)
    }
}
