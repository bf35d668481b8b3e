use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::domain::{
    BillList, BillListId, NewTransaction, Participant, Transaction, TransactionId,
    TransactionUpdate, User, format_split, parse_split,
};

use super::MIGRATION_001_INITIAL;

const TRANSACTION_COLUMNS: &str =
    "id, bill_list_id, amount_cents, whatfor, payer, split_between, recorded_at";

/// True when `err` comes from a UNIQUE constraint rejecting a write.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|db_err| db_err.is_unique_violation())
}

/// Repository for persisting and querying users, bill lists, participants
/// and transactions.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    /// Insert a user and return it with its assigned id.
    pub async fn save_user(&self, username: &str, password_hash: &str) -> Result<User> {
        let created_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, created_at)
            VALUES (?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .context("Failed to save user")?;

        Ok(User {
            id: row.get("id"),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by username")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// List users ordered by id, skipping `skip` and returning at most `limit`.
    pub async fn list_users(&self, skip: i64, limit: i64) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, username, password_hash, created_at
            FROM users
            ORDER BY id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        let created_at_str: String = row.get("created_at");
        Ok(User {
            id: row.get("id"),
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            created_at: parse_timestamp(&created_at_str).context("Invalid user created_at")?,
        })
    }

    // ========================
    // Bill list operations
    // ========================

    /// Insert a bill list and its initial participants in one transaction.
    /// The list row is written first so participants can reference its id.
    pub async fn create_bill_list(&self, title: &str, participants: &[String]) -> Result<BillList> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query("INSERT INTO bill_lists (title, created_at) VALUES (?, ?) RETURNING id")
            .bind(title)
            .bind(created_at.to_rfc3339())
            .fetch_one(&mut *tx)
            .await
            .context("Failed to save bill list")?;
        let id: BillListId = row.get("id");

        let mut saved = Vec::with_capacity(participants.len());
        for name in participants {
            saved.push(Self::insert_participant(&mut *tx, id, name).await?);
        }

        tx.commit().await.context("Failed to commit bill list")?;

        Ok(BillList {
            id,
            title: title.to_string(),
            created_at,
            participants: saved,
            transactions: Vec::new(),
        })
    }

    /// Get a bill list with its participants and transactions.
    pub async fn get_bill_list(&self, id: BillListId) -> Result<Option<BillList>> {
        let row = sqlx::query("SELECT id, title, created_at FROM bill_lists WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch bill list")?;

        match row {
            Some(row) => Ok(Some(self.load_bill_list(&row).await?)),
            None => Ok(None),
        }
    }

    /// List all bill lists, ordered by id.
    pub async fn list_bill_lists(&self) -> Result<Vec<BillList>> {
        let rows = sqlx::query("SELECT id, title, created_at FROM bill_lists ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list bill lists")?;

        let mut lists = Vec::with_capacity(rows.len());
        for row in &rows {
            lists.push(self.load_bill_list(row).await?);
        }
        Ok(lists)
    }

    pub async fn bill_list_exists(&self, id: BillListId) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM bill_lists WHERE id = ?) AS found")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to check bill list")?;
        Ok(row.get::<i64, _>("found") != 0)
    }

    /// Delete a bill list together with its participants and transactions.
    /// Returns false when no such list exists.
    pub async fn delete_bill_list(&self, id: BillListId) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM transactions WHERE bill_list_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete bill list transactions")?;
        sqlx::query("DELETE FROM participants WHERE bill_list_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete bill list participants")?;
        let deleted = sqlx::query("DELETE FROM bill_lists WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete bill list")?
            .rows_affected();

        tx.commit().await.context("Failed to commit bill list deletion")?;
        Ok(deleted > 0)
    }

    async fn load_bill_list(&self, row: &sqlx::sqlite::SqliteRow) -> Result<BillList> {
        let id: BillListId = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(BillList {
            id,
            title: row.get("title"),
            created_at: parse_timestamp(&created_at_str)
                .context("Invalid bill list created_at")?,
            participants: self.list_participants(id).await?,
            transactions: self.list_transactions(id).await?,
        })
    }

    // ========================
    // Participant operations
    // ========================

    pub async fn save_participant(&self, bill_list_id: BillListId, name: &str) -> Result<Participant> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::insert_participant(&mut *conn, bill_list_id, name).await
    }

    pub async fn list_participants(&self, bill_list_id: BillListId) -> Result<Vec<Participant>> {
        let rows = sqlx::query(
            "SELECT id, name, bill_list_id FROM participants WHERE bill_list_id = ? ORDER BY id",
        )
        .bind(bill_list_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list participants")?;

        Ok(rows
            .iter()
            .map(|row| Participant {
                id: row.get("id"),
                name: row.get("name"),
                bill_list_id: row.get("bill_list_id"),
            })
            .collect())
    }

    async fn insert_participant(
        conn: &mut SqliteConnection,
        bill_list_id: BillListId,
        name: &str,
    ) -> Result<Participant> {
        let row = sqlx::query("INSERT INTO participants (name, bill_list_id) VALUES (?, ?) RETURNING id")
            .bind(name)
            .bind(bill_list_id)
            .fetch_one(&mut *conn)
            .await
            .with_context(|| format!("Failed to save participant '{}'", name))?;

        Ok(Participant {
            id: row.get("id"),
            name: name.to_string(),
            bill_list_id,
        })
    }

    // ========================
    // Transaction operations
    // ========================

    /// Insert a transaction under `bill_list_id` and return it.
    pub async fn save_transaction(
        &self,
        bill_list_id: BillListId,
        new: &NewTransaction,
    ) -> Result<Transaction> {
        let recorded_at = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO transactions (bill_list_id, amount_cents, whatfor, payer, split_between, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(bill_list_id)
        .bind(new.amount_cents)
        .bind(&new.whatfor)
        .bind(&new.payer)
        .bind(format_split(&new.split_between))
        .bind(recorded_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .context("Failed to save transaction")?;

        Ok(Transaction {
            id: row.get("id"),
            bill_list_id,
            amount_cents: new.amount_cents,
            whatfor: new.whatfor.clone(),
            payer: new.payer.clone(),
            split_between: new.split_between.clone(),
            recorded_at,
        })
    }

    /// Apply a partial update in one storage transaction.
    /// Returns None when the (bill list, transaction) pair does not resolve.
    pub async fn update_transaction(
        &self,
        bill_list_id: BillListId,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<Option<Transaction>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let Some(mut transaction) = Self::fetch_transaction(&mut *tx, bill_list_id, id).await? else {
            return Ok(None);
        };
        update.apply(&mut transaction);

        sqlx::query(
            r#"
            UPDATE transactions
            SET amount_cents = ?, whatfor = ?, payer = ?, split_between = ?
            WHERE id = ? AND bill_list_id = ?
            "#,
        )
        .bind(transaction.amount_cents)
        .bind(&transaction.whatfor)
        .bind(&transaction.payer)
        .bind(format_split(&transaction.split_between))
        .bind(id)
        .bind(bill_list_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update transaction")?;

        tx.commit().await.context("Failed to commit transaction update")?;
        Ok(Some(transaction))
    }

    /// Delete a transaction. Returns false when it was not there.
    pub async fn delete_transaction(&self, bill_list_id: BillListId, id: TransactionId) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM transactions WHERE id = ? AND bill_list_id = ?")
            .bind(id)
            .bind(bill_list_id)
            .execute(&self.pool)
            .await
            .context("Failed to delete transaction")?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// List the transactions of a bill list in insertion order.
    pub async fn list_transactions(&self, bill_list_id: BillListId) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE bill_list_id = ? ORDER BY id",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(bill_list_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn fetch_transaction(
        conn: &mut SqliteConnection,
        bill_list_id: BillListId,
        id: TransactionId,
    ) -> Result<Option<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE id = ? AND bill_list_id = ?",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(bill_list_id)
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch transaction")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let split_str: String = row.get("split_between");
        let recorded_at_str: String = row.get("recorded_at");

        Ok(Transaction {
            id: row.get("id"),
            bill_list_id: row.get("bill_list_id"),
            amount_cents: row.get("amount_cents"),
            whatfor: row.get("whatfor"),
            payer: row.get("payer"),
            split_between: parse_split(&split_str),
            recorded_at: parse_timestamp(&recorded_at_str)
                .context("Invalid transaction recorded_at")?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
