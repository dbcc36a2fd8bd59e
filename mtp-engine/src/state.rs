/// The per-device state machine (§4.3).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineState {
    /// Initial state, and the state after `close()`.
    Disconnected,
    /// Interface claimed, no session open.
    Attached,
    /// `OpenSession` sent, awaiting response.
    SessionOpening,
    /// Session open, idle.
    SessionActive,
    /// A command has been issued and not yet responded to.
    CommandInFlight,
    /// `CloseSession` sent, awaiting response.
    SessionClosing,
}

impl EngineState {
    /// Whether `to` is a legal transition from `self` (§4.3 state table).
    pub fn can_transition_to(self, to: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, to),
            (Disconnected, Attached)
                | (Attached, SessionOpening)
                | (SessionOpening, SessionActive)
                | (SessionOpening, Attached)
                | (SessionActive, CommandInFlight)
                | (SessionActive, SessionClosing)
                | (SessionActive, Attached)
                | (CommandInFlight, SessionActive)
                | (CommandInFlight, Attached)
                | (SessionClosing, Attached)
        )
    }
}

/// Session identity and transaction-ID counter (§3 `Session`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// Always ≥ 1 while a session is open.
    pub session_id: u32,
    /// Whether the session is currently open.
    pub open: bool,
    /// The txid that will be assigned to the next issued command.
    pub next_txid: u32,
}

impl Session {
    /// A session that has not yet been opened.
    pub fn closed() -> Self {
        Self {
            session_id: 0,
            open: false,
            next_txid: 1,
        }
    }

    /// Open with `session_id`, resetting the txid counter to 1 (§4.3
    /// "Transaction discipline").
    pub fn open(session_id: u32) -> Self {
        Self {
            session_id,
            open: true,
            next_txid: 1,
        }
    }

    /// Assign the next txid and advance the counter, wrapping
    /// explicitly at `u32::MAX` (§3).
    pub fn next_txid(&mut self) -> u32 {
        let txid = self.next_txid;
        self.next_txid = self.next_txid.wrapping_add(1);
        if self.next_txid == 0 {
            // txid 0 is reserved for "no transaction"; skip it on wrap.
            self.next_txid = 1;
        }
        txid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_txids_increment_from_one() {
        let mut s = Session::open(7);
        assert_eq!(s.next_txid(), 1);
        assert_eq!(s.next_txid(), 2);
        assert_eq!(s.next_txid(), 3);
    }

    #[test]
    fn session_txid_wraps_past_zero() {
        let mut s = Session::open(1);
        s.next_txid = u32::MAX;
        assert_eq!(s.next_txid(), u32::MAX);
        assert_eq!(s.next_txid(), 1);
    }

    #[test]
    fn legal_transitions_accepted() {
        assert!(EngineState::Disconnected.can_transition_to(EngineState::Attached));
        assert!(EngineState::SessionActive.can_transition_to(EngineState::CommandInFlight));
    }

    #[test]
    fn illegal_transitions_rejected() {
        assert!(!EngineState::Disconnected.can_transition_to(EngineState::SessionActive));
        assert!(!EngineState::CommandInFlight.can_transition_to(EngineState::SessionOpening));
    }
}
