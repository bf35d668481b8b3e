use thiserror::Error;

use crate::domain::{BillListId, TransactionId};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bill list not found: {0}")]
    BillListNotFound(BillListId),

    #[error("Transaction {transaction_id} not found in bill list {bill_list_id}")]
    TransactionNotFound {
        bill_list_id: BillListId,
        transaction_id: TransactionId,
    },

    #[error("Username already registered: {0}")]
    DuplicateUsername(String),

    #[error("Participant '{name}' already exists in bill list {bill_list_id}")]
    DuplicateParticipant {
        bill_list_id: BillListId,
        name: String,
    },

    #[error("'{name}' is not a participant of bill list {bill_list_id}")]
    UnknownParticipant {
        bill_list_id: BillListId,
        name: String,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// True for outcomes where the referenced bill list or transaction is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::BillListNotFound(_) | AppError::TransactionNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants() {
        assert!(AppError::BillListNotFound(1).is_not_found());
        assert!(
            AppError::TransactionNotFound {
                bill_list_id: 1,
                transaction_id: 2
            }
            .is_not_found()
        );
        assert!(!AppError::Validation("x".into()).is_not_found());
    }

    #[test]
    fn test_error_messages() {
        let err = AppError::UnknownParticipant {
            bill_list_id: 3,
            name: "ghost".into(),
        };
        assert_eq!(err.to_string(), "'ghost' is not a participant of bill list 3");
    }
}
