//! Architecture mode transitions. The local mode only changes once the service has
//! acknowledged the switch; a rejected switch leaves everything as it was.

use crate::model::Mode;

#[derive(Debug, PartialEq, Eq)]
pub enum SwitchRequest {
    /// Target equals the current mode; nothing to do.
    AlreadyActive,
    /// Another switch is still waiting for the service.
    InFlight { pending: Mode },
    /// Caller must invoke the mode-switch service for this target.
    Dispatch(Mode),
}

#[derive(Debug)]
pub struct ModeController {
    current: Mode,
    pending: Option<Mode>,
}

impl ModeController {
    pub fn new(initial: Mode) -> Self {
        Self {
            current: initial,
            pending: None,
        }
    }

    pub fn current(&self) -> Mode {
        self.current
    }

    pub fn pending(&self) -> Option<Mode> {
        self.pending
    }

    pub fn request(&mut self, target: Mode) -> SwitchRequest {
        if target == self.current {
            return SwitchRequest::AlreadyActive;
        }
        if let Some(pending) = self.pending {
            return SwitchRequest::InFlight { pending };
        }
        self.pending = Some(target);
        SwitchRequest::Dispatch(target)
    }

    /// Returns true when the switch took effect and dependants must reset.
    pub fn resolve(&mut self, target: Mode, succeeded: bool) -> bool {
        if self.pending == Some(target) {
            self.pending = None;
        }
        if !succeeded || target == self.current {
            return false;
        }
        self.current = target;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_mode_is_noop() {
        let mut controller = ModeController::new(Mode::Centralized);
        assert_eq!(
            controller.request(Mode::Centralized),
            SwitchRequest::AlreadyActive
        );
        assert_eq!(controller.pending(), None);
    }

    #[test]
    fn success_applies_target() {
        let mut controller = ModeController::new(Mode::Centralized);
        assert_eq!(
            controller.request(Mode::Decentralized),
            SwitchRequest::Dispatch(Mode::Decentralized)
        );
        assert!(controller.resolve(Mode::Decentralized, true));
        assert_eq!(controller.current(), Mode::Decentralized);
        assert_eq!(controller.pending(), None);
    }

    #[test]
    fn failure_leaves_mode_unchanged() {
        let mut controller = ModeController::new(Mode::Centralized);
        controller.request(Mode::Decentralized);
        assert!(!controller.resolve(Mode::Decentralized, false));
        assert_eq!(controller.current(), Mode::Centralized);
        assert_eq!(controller.pending(), None);
    }

    #[test]
    fn second_request_waits_for_first() {
        let mut controller = ModeController::new(Mode::Centralized);
        controller.request(Mode::Decentralized);
        assert_eq!(
            controller.request(Mode::Decentralized),
            SwitchRequest::InFlight {
                pending: Mode::Decentralized
            }
        );
    }
}
