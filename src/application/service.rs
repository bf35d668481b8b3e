use std::collections::BTreeSet;

use crate::domain::{
    BalanceMatrix, BillList, BillListId, Cents, NewTransaction, Participant, Transaction,
    TransactionId, TransactionUpdate, User, compute_balances, first_duplicate_name,
    unknown_names, validate_participant_name,
};
use crate::storage::{Repository, is_unique_violation};

use super::{AppError, hash_password, verify_password};

/// How payer and split names are checked against a bill list's participants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MembershipPolicy {
    /// Any name is accepted. Names that are not participants are logged and
    /// left out of balance computation.
    #[default]
    Permissive,
    /// Names that are not participants are rejected.
    Strict,
}

/// Application service for users, bill lists, transactions and balances.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct BillService {
    repo: Repository,
    membership: MembershipPolicy,
}

impl BillService {
    /// Create a new service over the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            membership: MembershipPolicy::default(),
        }
    }

    pub fn with_membership_policy(mut self, membership: MembershipPolicy) -> Self {
        self.membership = membership;
        self
    }

    pub fn membership_policy(&self) -> MembershipPolicy {
        self.membership
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // User operations
    // ========================

    /// Register a user. The password is stored only as an Argon2 hash.
    pub async fn create_user(&self, username: String, password: &str) -> Result<User, AppError> {
        if username.trim().is_empty() {
            return Err(AppError::Validation("username cannot be blank".to_string()));
        }
        let password_hash = hash_password(password)?;
        let saved = self.repo.save_user(&username, &password_hash).await;
        let user = match saved {
            Ok(user) => user,
            Err(e) if is_unique_violation(&e) => return Err(AppError::DuplicateUsername(username)),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(user_id = user.id, username = %user.username, "created user");
        Ok(user)
    }

    pub async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>, AppError> {
        if skip < 0 || limit < 0 {
            return Err(AppError::Validation(
                "skip and limit must not be negative".to_string(),
            ));
        }
        Ok(self.repo.list_users(skip, limit).await?)
    }

    /// Check a username/password pair. Unknown users simply fail the check.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> Result<bool, AppError> {
        match self.repo.get_user_by_username(username).await? {
            Some(user) => verify_password(password, &user.password_hash),
            None => Ok(false),
        }
    }

    // ========================
    // Bill list operations
    // ========================

    /// Create a bill list with its initial participants (possibly none).
    pub async fn create_bill_list(
        &self,
        title: String,
        participants: Vec<String>,
    ) -> Result<BillList, AppError> {
        for name in &participants {
            validate_participant_name(name).map_err(AppError::Validation)?;
        }
        if let Some(name) = first_duplicate_name(&participants) {
            return Err(AppError::Validation(format!(
                "participant '{}' is listed more than once",
                name
            )));
        }

        let bill_list = self.repo.create_bill_list(&title, &participants).await?;
        tracing::info!(
            bill_list_id = bill_list.id,
            participants = bill_list.participants.len(),
            "created bill list"
        );
        Ok(bill_list)
    }

    /// Get a bill list with its participants and transactions.
    pub async fn get_bill_list(&self, id: BillListId) -> Result<BillList, AppError> {
        self.repo
            .get_bill_list(id)
            .await?
            .ok_or(AppError::BillListNotFound(id))
    }

    pub async fn list_bill_lists(&self) -> Result<Vec<BillList>, AppError> {
        Ok(self.repo.list_bill_lists().await?)
    }

    /// Delete a bill list with everything it owns. Returns whether it existed.
    pub async fn delete_bill_list(&self, id: BillListId) -> Result<bool, AppError> {
        let deleted = self.repo.delete_bill_list(id).await?;
        if deleted {
            tracing::info!(bill_list_id = id, "deleted bill list");
        } else {
            tracing::debug!(bill_list_id = id, "bill list to delete not found");
        }
        Ok(deleted)
    }

    /// Add a participant to an existing bill list.
    pub async fn add_participant(
        &self,
        bill_list_id: BillListId,
        name: String,
    ) -> Result<Participant, AppError> {
        validate_participant_name(&name).map_err(AppError::Validation)?;
        if !self.repo.bill_list_exists(bill_list_id).await? {
            return Err(AppError::BillListNotFound(bill_list_id));
        }

        let saved = self.repo.save_participant(bill_list_id, &name).await;
        let participant = match saved {
            Ok(participant) => participant,
            Err(e) if is_unique_violation(&e) => {
                return Err(AppError::DuplicateParticipant { bill_list_id, name });
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(bill_list_id, name = %participant.name, "added participant");
        Ok(participant)
    }

    // ========================
    // Transaction operations
    // ========================

    /// Record a transaction under a bill list. Names are normalized first, so
    /// the returned transaction matches what a later read gives back.
    pub async fn create_transaction(
        &self,
        bill_list_id: BillListId,
        new: NewTransaction,
    ) -> Result<Transaction, AppError> {
        let new = new.normalized();
        validate_amount(new.amount_cents)?;
        validate_payer(&new.payer)?;
        let participants = self.participant_names(bill_list_id).await?;
        self.check_membership(bill_list_id, &participants, new.referenced_names())?;

        let transaction = self.repo.save_transaction(bill_list_id, &new).await?;
        tracing::info!(
            bill_list_id,
            transaction_id = transaction.id,
            amount_cents = transaction.amount_cents,
            "recorded transaction"
        );
        Ok(transaction)
    }

    /// Apply a partial update. Returns None when the transaction does not
    /// exist in that bill list.
    pub async fn update_transaction(
        &self,
        bill_list_id: BillListId,
        transaction_id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<Option<Transaction>, AppError> {
        let update = update.normalized();
        if let Some(amount_cents) = update.amount_cents {
            validate_amount(amount_cents)?;
        }
        if let Some(payer) = &update.payer {
            validate_payer(payer)?;
        }
        if update.payer.is_some() || update.split_between.is_some() {
            let participants = match self.participant_names(bill_list_id).await {
                Ok(participants) => participants,
                Err(AppError::BillListNotFound(_)) => return Ok(None),
                Err(e) => return Err(e),
            };
            self.check_membership(bill_list_id, &participants, update.referenced_names())?;
        }

        let updated = self
            .repo
            .update_transaction(bill_list_id, transaction_id, update)
            .await?;
        match &updated {
            Some(_) => tracing::info!(bill_list_id, transaction_id, "updated transaction"),
            None => tracing::debug!(bill_list_id, transaction_id, "transaction to update not found"),
        }
        Ok(updated)
    }

    /// Delete a transaction. Returns whether it existed.
    pub async fn delete_transaction(
        &self,
        bill_list_id: BillListId,
        transaction_id: TransactionId,
    ) -> Result<bool, AppError> {
        let deleted = self
            .repo
            .delete_transaction(bill_list_id, transaction_id)
            .await?;
        if deleted {
            tracing::info!(bill_list_id, transaction_id, "deleted transaction");
        }
        Ok(deleted)
    }

    pub async fn list_transactions(
        &self,
        bill_list_id: BillListId,
    ) -> Result<Vec<Transaction>, AppError> {
        if !self.repo.bill_list_exists(bill_list_id).await? {
            return Err(AppError::BillListNotFound(bill_list_id));
        }
        Ok(self.repo.list_transactions(bill_list_id).await?)
    }

    // ========================
    // Balance operations
    // ========================

    /// Recompute the pairwise balance matrix of a bill list from its
    /// stored transactions.
    pub async fn compute_balance(&self, bill_list_id: BillListId) -> Result<BalanceMatrix, AppError> {
        let bill_list = self.get_bill_list(bill_list_id).await?;
        let participants = bill_list.participant_names();

        let unknown = unknown_names(&participants, &bill_list.transactions);
        if !unknown.is_empty() {
            tracing::warn!(
                bill_list_id,
                names = ?unknown,
                "transactions reference names that are not participants; they are left out of the balance"
            );
        }

        let matrix = compute_balances(&participants, &bill_list.transactions);
        tracing::debug!(
            bill_list_id,
            transactions = bill_list.transactions.len(),
            "computed balance"
        );
        Ok(matrix)
    }

    async fn participant_names(&self, bill_list_id: BillListId) -> Result<Vec<String>, AppError> {
        if !self.repo.bill_list_exists(bill_list_id).await? {
            return Err(AppError::BillListNotFound(bill_list_id));
        }
        Ok(self
            .repo
            .list_participants(bill_list_id)
            .await?
            .into_iter()
            .map(|p| p.name)
            .collect())
    }

    fn check_membership<'a>(
        &self,
        bill_list_id: BillListId,
        participants: &[String],
        names: impl Iterator<Item = &'a str>,
    ) -> Result<(), AppError> {
        let unknown: BTreeSet<&str> = names
            .filter(|name| !participants.iter().any(|p| p.as_str() == *name))
            .collect();
        let Some(first) = unknown.first() else {
            return Ok(());
        };

        match self.membership {
            MembershipPolicy::Strict => Err(AppError::UnknownParticipant {
                bill_list_id,
                name: first.to_string(),
            }),
            MembershipPolicy::Permissive => {
                tracing::warn!(bill_list_id, names = ?unknown, "names are not participants of the bill list");
                Ok(())
            }
        }
    }
}

fn validate_amount(amount_cents: Cents) -> Result<(), AppError> {
    if amount_cents < 0 {
        return Err(AppError::InvalidAmount(
            "Amount must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_payer(payer: &str) -> Result<(), AppError> {
    if payer.is_empty() {
        return Err(AppError::Validation("payer cannot be blank".to_string()));
    }
    Ok(())
}
