//! Pure state machine for the spec.md §4.5 transaction lifecycle diagram.
//! Kept free of I/O so P1 ("every transition follows a legal edge; no
//! terminal state is ever left") is a direct unit test, not an integration
//! test against the database.

use crate::models::transaction::{FailureReason, TxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxEvent {
    Submit,
    AckSubmitted,
    RpcFail,
    Reject,
    EnterMempool,
    Included,
    ReachedConfirmations,
    ExpiredWhilePending,
    Revert,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: TxStatus,
    pub event: TxEvent,
}

impl std::fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal transition: {:?} from {:?}", self.event, self.from)
    }
}

impl std::error::Error for IllegalTransition {}

/// `None` failure reason for transitions that don't terminate into `failed`;
/// callers ignore it otherwise.
pub fn transition(from: TxStatus, event: TxEvent) -> Result<(TxStatus, Option<FailureReason>), IllegalTransition> {
    use TxEvent::*;
    use TxStatus::*;

    let illegal = || IllegalTransition { from, event };

    match (from, event) {
        (Created, Submit) => Ok((Submitted, None)),
        (Created, Cancel) => Ok((Cancelled, None)),
        // Retries exhausted before a single successful acknowledgement.
        (Created, Reject) => Ok((Failed, Some(FailureReason::RpcError))),

        (Submitted, AckSubmitted) => Ok((Submitted, None)),
        (Submitted, EnterMempool) => Ok((Pending, None)),
        (Submitted, RpcFail) => Ok((Created, None)),
        (Submitted, Reject) => Ok((Failed, Some(FailureReason::RpcError))),

        (Pending, Included) => Ok((Confirming, None)),
        (Pending, ExpiredWhilePending) => Ok((Expired, Some(FailureReason::Expired))),

        (Confirming, ReachedConfirmations) => Ok((Confirmed, None)),
        (Confirming, Revert) => Ok((Failed, Some(FailureReason::Reverted))),

        _ => Err(illegal()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TxEvent::*;
    use TxStatus::*;

    #[test]
    fn happy_path_reaches_confirmed() {
        let mut status = Created;
        for event in [Submit, EnterMempool, Included, ReachedConfirmations] {
            let (next, _) = transition(status, event).unwrap();
            status = next;
        }
        assert_eq!(status, Confirmed);
    }

    #[test]
    fn rpc_fail_returns_to_created_for_retry() {
        let (next, reason) = transition(Submitted, RpcFail).unwrap();
        assert_eq!(next, Created);
        assert!(reason.is_none());
    }

    #[test]
    fn reject_is_terminal_with_rpc_error_reason() {
        let (next, reason) = transition(Submitted, Reject).unwrap();
        assert_eq!(next, Failed);
        assert_eq!(reason, Some(FailureReason::RpcError));
        assert!(next.is_terminal());
    }

    #[test]
    fn revert_after_confirming_is_failed() {
        let (next, reason) = transition(Confirming, Revert).unwrap();
        assert_eq!(next, Failed);
        assert_eq!(reason, Some(FailureReason::Reverted));
    }

    #[test]
    fn pending_timeout_is_expired() {
        let (next, reason) = transition(Pending, ExpiredWhilePending).unwrap();
        assert_eq!(next, Expired);
        assert_eq!(reason, Some(FailureReason::Expired));
    }

    #[test]
    fn cannot_leave_a_terminal_state() {
        for terminal in [Confirmed, Failed, Expired, Cancelled] {
            assert!(transition(terminal, Submit).is_err());
            assert!(transition(terminal, Cancel).is_err());
        }
    }

    #[test]
    fn cannot_skip_from_created_to_confirming() {
        assert!(transition(Created, Included).is_err());
    }

    #[test]
    fn cancel_only_legal_from_created() {
        assert!(transition(Created, Cancel).is_ok());
        assert!(transition(Submitted, Cancel).is_err());
        assert!(transition(Pending, Cancel).is_err());
    }
}
