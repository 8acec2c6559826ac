use thiserror::Error;

/// All errors surfaced by ledger operations.
///
/// Idempotent-no-op outcomes (duplicate allocation insert, duplicate bonus
/// grant) are absorbed inside the operations and never reach this enum.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Answer payload shorter than the configured minimum.
    #[error("answer too short")]
    AnswerTooShort,

    /// Non-positive withdrawal amount.
    #[error("amount must be positive")]
    InvalidAmount,

    /// Empty destination descriptor on a withdrawal request.
    #[error("destination missing")]
    DestinationMissing,

    /// No such user row.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// No assignment exists for (user, today, task).
    #[error("task not assigned today")]
    NotAssignedToday,

    /// The assignment was already completed; no second credit.
    #[error("task already completed")]
    AlreadyCompleted,

    /// The task definition was deactivated after assignment.
    #[error("task unavailable")]
    TaskUnavailable,

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: i64, need: i64 },

    #[error("bonus threshold unmet: have {have}, need {need}")]
    BonusThresholdUnmet { have: i64, need: i64 },

    #[error("withdrawal not found: {0}")]
    WithdrawalNotFound(i64),

    /// pending -> paid is the only allowed transition; paid is terminal.
    #[error("withdrawal already paid: {0}")]
    AlreadyPaid(i64),

    /// Transaction abort, constraint failure, connectivity loss. Safe to
    /// retry: every operation re-checks its guard inside the transaction.
    #[error("storage error: {0}")]
    Store(#[from] rusqlite::Error),
}

/// Coarse classification used by the HTTP layer for status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Store,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AnswerTooShort
            | LedgerError::InvalidAmount
            | LedgerError::DestinationMissing => ErrorKind::Validation,
            LedgerError::NotAssignedToday
            | LedgerError::AlreadyCompleted
            | LedgerError::TaskUnavailable
            | LedgerError::InsufficientBalance { .. }
            | LedgerError::BonusThresholdUnmet { .. }
            | LedgerError::AlreadyPaid(_) => ErrorKind::Conflict,
            LedgerError::UnknownUser(_) | LedgerError::WithdrawalNotFound(_) => ErrorKind::NotFound,
            LedgerError::Store(_) => ErrorKind::Store,
        }
    }

    /// Stable machine-readable reason string for rejection bodies.
    pub fn reason(&self) -> &'static str {
        match self {
            LedgerError::AnswerTooShort => "answer_too_short",
            LedgerError::InvalidAmount => "invalid_amount",
            LedgerError::DestinationMissing => "destination_missing",
            LedgerError::UnknownUser(_) => "unknown_user",
            LedgerError::NotAssignedToday => "not_assigned_today",
            LedgerError::AlreadyCompleted => "already_completed",
            LedgerError::TaskUnavailable => "task_unavailable",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::BonusThresholdUnmet { .. } => "bonus_threshold_unmet",
            LedgerError::WithdrawalNotFound(_) => "withdrawal_not_found",
            LedgerError::AlreadyPaid(_) => "already_paid",
            LedgerError::Store(_) => "storage",
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(LedgerError::AnswerTooShort.kind(), ErrorKind::Validation);
        assert_eq!(LedgerError::AlreadyCompleted.kind(), ErrorKind::Conflict);
        assert_eq!(
            LedgerError::InsufficientBalance { have: 1, need: 2 }.kind(),
            ErrorKind::Conflict
        );
        assert_eq!(LedgerError::WithdrawalNotFound(7).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_reason_strings_stable() {
        assert_eq!(LedgerError::NotAssignedToday.reason(), "not_assigned_today");
        assert_eq!(LedgerError::AlreadyPaid(1).reason(), "already_paid");
    }
}
