//! Exchange status rules
//!
//! The aggregate status of an exchange is a pure function of its two
//! participant statuses. Participant moves follow a fixed table.

use crate::error::{conflict_error, AppResult};
use crate::models::{ExchangeStatus, ParticipantStatus};

use crate::models::ParticipantStatus::{Confirm1, Confirm2, Created, Failed, Success};

/// Combine both participant statuses into the exchange status
pub fn derive_exchange_status(a: ParticipantStatus, b: ParticipantStatus) -> ExchangeStatus {
    let confirmed_twice = |s: ParticipantStatus| matches!(s, Confirm2 | Success);
    let confirmed = |s: ParticipantStatus| matches!(s, Confirm1 | Confirm2 | Success);

    if a == Failed || b == Failed {
        ExchangeStatus::Failed
    } else if confirmed_twice(a) && confirmed_twice(b) {
        ExchangeStatus::Success
    } else if confirmed(a) && confirmed(b) {
        ExchangeStatus::Confirm
    } else {
        ExchangeStatus::Created
    }
}

/// Moves a participant may make
pub const TRANSITIONS: &[(ParticipantStatus, ParticipantStatus)] = &[
    (Created, Confirm1),
    (Confirm1, Confirm2),
    (Created, Failed),
    (Confirm1, Failed),
    (Confirm2, Failed),
];

/// Check a participant move against the table. `confirm_2` additionally
/// needs the exchange to be in `confirm`, i.e. the partner confirmed once.
pub fn check_transition(
    from: ParticipantStatus,
    to: ParticipantStatus,
    aggregate: ExchangeStatus,
) -> AppResult<()> {
    if !TRANSITIONS.contains(&(from, to)) {
        return Err(conflict_error(format!(
            "Cannot change participant status from {} to {}",
            from, to
        )));
    }
    if to == Confirm2 && aggregate != ExchangeStatus::Confirm {
        return Err(conflict_error(
            "Both participants must confirm once before the final confirmation",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ALL: [ParticipantStatus; 5] = [Created, Confirm1, Confirm2, Success, Failed];

    #[test]
    fn test_derivation_over_all_pairs() {
        for a in ALL {
            for b in ALL {
                let expected = match (a, b) {
                    (Failed, _) | (_, Failed) => ExchangeStatus::Failed,
                    (Confirm2 | Success, Confirm2 | Success) => ExchangeStatus::Success,
                    (Created, _) | (_, Created) => ExchangeStatus::Created,
                    _ => ExchangeStatus::Confirm,
                };
                assert_eq!(derive_exchange_status(a, b), expected, "pair ({}, {})", a, b);
            }
        }
    }

    #[test]
    fn test_derivation_is_symmetric() {
        for a in ALL {
            for b in ALL {
                assert_eq!(derive_exchange_status(a, b), derive_exchange_status(b, a));
            }
        }
    }

    #[test]
    fn test_transition_table() {
        for from in ALL {
            for to in ALL {
                let allowed = check_transition(from, to, ExchangeStatus::Confirm).is_ok();
                assert_eq!(allowed, TRANSITIONS.contains(&(from, to)), "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_second_confirmation_waits_for_partner() {
        assert!(check_transition(Confirm1, Confirm2, ExchangeStatus::Created).is_err());
        assert!(check_transition(Confirm1, Confirm2, ExchangeStatus::Confirm).is_ok());
    }

    #[test]
    fn test_success_and_failed_are_terminal() {
        for to in ALL {
            assert!(check_transition(Success, to, ExchangeStatus::Success).is_err());
            assert!(check_transition(Failed, to, ExchangeStatus::Failed).is_err());
        }
    }
}
