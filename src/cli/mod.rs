use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::application::{AppError, BillService, MembershipPolicy};
use crate::domain::{
    BalanceMatrix, BillList, BillListId, NewTransaction, Transaction, TransactionId,
    TransactionUpdate, format_cents, format_split, parse_cents, parse_split,
};

/// Tabbly - shared expenses and who owes whom
#[derive(Parser)]
#[command(name = "tabbly")]
#[command(about = "Track shared expenses in bill lists and compute pairwise balances")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "TABBLY_DATABASE", default_value = "tabbly.db")]
    pub database: String,

    /// Reject payer and split names that are not participants of the bill list
    #[arg(long, env = "TABBLY_STRICT_PARTICIPANTS", global = true)]
    pub strict_participants: bool,

    /// Log filter (e.g. "warn", "tabbly=debug"); RUST_LOG takes precedence
    #[arg(long, env = "TABBLY_LOG", default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Bill list management commands
    #[command(subcommand)]
    List(ListCommands),

    /// Transaction commands
    #[command(subcommand)]
    Tx(TransactionCommands),

    /// Show who owes whom in a bill list
    Balance {
        /// Bill list ID
        bill_list_id: BillListId,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Export a bill list to CSV or JSON
    Export {
        /// Bill list ID
        bill_list_id: BillListId,

        /// What to export: transactions, balance, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Create {
        /// Username (must be unique)
        username: String,

        /// Password
        #[arg(short, long, env = "TABBLY_PASSWORD")]
        password: String,
    },

    /// List users
    List {
        /// Number of users to skip
        #[arg(long, default_value = "0")]
        skip: i64,

        /// Maximum number of users to show
        #[arg(short, long, default_value = "100")]
        limit: i64,
    },
}

#[derive(Subcommand)]
pub enum ListCommands {
    /// Create a bill list
    Create {
        /// Title of the bill list
        title: String,

        /// Participant name (repeat for each participant)
        #[arg(short, long = "participant")]
        participants: Vec<String>,
    },

    /// Show a bill list with its participants and transactions
    Show {
        /// Bill list ID
        id: BillListId,
    },

    /// List all bill lists
    All,

    /// Delete a bill list with its participants and transactions
    Delete {
        /// Bill list ID
        id: BillListId,
    },

    /// Add a participant to a bill list
    AddParticipant {
        /// Bill list ID
        id: BillListId,

        /// Participant name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// Record an expense
    Add {
        /// Bill list ID
        bill_list_id: BillListId,

        /// Amount paid (e.g., "50.00" or "50")
        amount: String,

        /// What the expense was for
        #[arg(short, long)]
        whatfor: String,

        /// Who paid
        #[arg(short, long)]
        payer: String,

        /// Who shares the cost, comma separated (e.g., "alice, bob")
        #[arg(short, long)]
        split: String,
    },

    /// Change some fields of a transaction
    Update {
        /// Bill list ID
        bill_list_id: BillListId,

        /// Transaction ID
        transaction_id: TransactionId,

        /// New amount
        #[arg(short, long)]
        amount: Option<String>,

        /// New description
        #[arg(short, long)]
        whatfor: Option<String>,

        /// New payer
        #[arg(short, long)]
        payer: Option<String>,

        /// New split, comma separated
        #[arg(short, long)]
        split: Option<String>,
    },

    /// Delete a transaction
    Delete {
        /// Bill list ID
        bill_list_id: BillListId,

        /// Transaction ID
        transaction_id: TransactionId,
    },

    /// List the transactions of a bill list
    List {
        /// Bill list ID
        bill_list_id: BillListId,
    },
}

impl Cli {
    /// Install the global tracing subscriber, logging to stderr.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.log_level))
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    fn membership_policy(&self) -> MembershipPolicy {
        if self.strict_participants {
            MembershipPolicy::Strict
        } else {
            MembershipPolicy::Permissive
        }
    }

    async fn connect(&self) -> Result<BillService> {
        let service = BillService::connect(&self.database)
            .await
            .with_context(|| format!("Failed to open database '{}'", self.database))?;
        Ok(service.with_membership_policy(self.membership_policy()))
    }

    pub async fn run(self) -> Result<()> {
        if let Commands::Init = self.command {
            BillService::init(&self.database).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let service = self.connect().await?;

        match self.command {
            Commands::Init => {}
            Commands::User(cmd) => run_user_command(&service, cmd).await?,
            Commands::List(cmd) => run_list_command(&service, cmd).await?,
            Commands::Tx(cmd) => run_transaction_command(&service, cmd).await?,
            Commands::Balance {
                bill_list_id,
                format,
            } => run_balance_command(&service, bill_list_id, &format).await?,
            Commands::Export {
                bill_list_id,
                export_type,
                output,
            } => {
                run_export_command(&service, bill_list_id, &export_type, output.as_deref()).await?
            }
        }

        Ok(())
    }
}

async fn run_user_command(service: &BillService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Create { username, password } => {
            let user = service.create_user(username, &password).await?;
            println!("Created user: {} ({})", user.username, user.id);
        }

        UserCommands::List { skip, limit } => {
            let users = service.list_users(skip, limit).await?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<6} {:<24} {:<20}", "ID", "USERNAME", "CREATED");
                println!("{}", "-".repeat(52));
                for user in users {
                    println!(
                        "{:<6} {:<24} {:<20}",
                        user.id,
                        user.username,
                        user.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_list_command(service: &BillService, cmd: ListCommands) -> Result<()> {
    match cmd {
        ListCommands::Create {
            title,
            participants,
        } => {
            let bill_list = service.create_bill_list(title, participants).await?;
            println!(
                "Created bill list: {} ({}) with {} participant(s)",
                bill_list.title,
                bill_list.id,
                bill_list.participants.len()
            );
        }

        ListCommands::Show { id } => {
            let bill_list = service.get_bill_list(id).await?;
            print_bill_list(&bill_list);
        }

        ListCommands::All => {
            let lists = service.list_bill_lists().await?;
            if lists.is_empty() {
                println!("No bill lists found.");
            } else {
                println!("{:<6} {:<30} {:>12} {:>12}", "ID", "TITLE", "PEOPLE", "EXPENSES");
                println!("{}", "-".repeat(63));
                for list in lists {
                    println!(
                        "{:<6} {:<30} {:>12} {:>12}",
                        list.id,
                        truncate(&list.title, 30),
                        list.participants.len(),
                        list.transactions.len()
                    );
                }
            }
        }

        ListCommands::Delete { id } => {
            if !service.delete_bill_list(id).await? {
                return Err(AppError::BillListNotFound(id).into());
            }
            println!("Deleted bill list {}", id);
        }

        ListCommands::AddParticipant { id, name } => {
            let participant = service.add_participant(id, name).await?;
            println!("Added {} to bill list {}", participant.name, id);
        }
    }
    Ok(())
}

async fn run_transaction_command(service: &BillService, cmd: TransactionCommands) -> Result<()> {
    match cmd {
        TransactionCommands::Add {
            bill_list_id,
            amount,
            whatfor,
            payer,
            split,
        } => {
            let amount_cents =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let new = NewTransaction::new(amount_cents, whatfor, payer, parse_split(&split));
            let transaction = service.create_transaction(bill_list_id, new).await?;
            println!(
                "Recorded transaction {}: {} paid {} for {}",
                transaction.id,
                transaction.payer,
                format_cents(transaction.amount_cents),
                format_split(&transaction.split_between)
            );
        }

        TransactionCommands::Update {
            bill_list_id,
            transaction_id,
            amount,
            whatfor,
            payer,
            split,
        } => {
            let amount_cents = amount
                .map(|a| parse_cents(&a))
                .transpose()
                .context("Invalid amount format. Use '50.00' or '50'")?;
            let update = TransactionUpdate {
                amount_cents,
                whatfor,
                payer,
                split_between: split.as_deref().map(parse_split),
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update: pass at least one of --amount, --whatfor, --payer, --split");
            }

            let transaction = service
                .update_transaction(bill_list_id, transaction_id, update)
                .await?
                .ok_or(AppError::TransactionNotFound {
                    bill_list_id,
                    transaction_id,
                })?;
            println!("Updated transaction {}", transaction.id);
            print_transactions(std::slice::from_ref(&transaction));
        }

        TransactionCommands::Delete {
            bill_list_id,
            transaction_id,
        } => {
            if !service
                .delete_transaction(bill_list_id, transaction_id)
                .await?
            {
                return Err(AppError::TransactionNotFound {
                    bill_list_id,
                    transaction_id,
                }
                .into());
            }
            println!("Deleted transaction {}", transaction_id);
        }

        TransactionCommands::List { bill_list_id } => {
            let transactions = service.list_transactions(bill_list_id).await?;
            if transactions.is_empty() {
                println!("No transactions found.");
            } else {
                print_transactions(&transactions);
            }
        }
    }
    Ok(())
}

async fn run_balance_command(
    service: &BillService,
    bill_list_id: BillListId,
    format: &str,
) -> Result<()> {
    let matrix = service.compute_balance(bill_list_id).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&matrix.to_units())?),
        "table" => print_balance(&matrix),
        _ => anyhow::bail!("Invalid format '{}'. Valid formats: table, json", format),
    }
    Ok(())
}

async fn run_export_command(
    service: &BillService,
    bill_list_id: BillListId,
    export_type: &str,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "transactions" => {
            let count = exporter
                .export_transactions_csv(bill_list_id, writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        "balance" => {
            let count = exporter.export_balance_csv(bill_list_id, writer).await?;
            if output.is_some() {
                eprintln!("Exported balance for {} participants", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_full_json(bill_list_id, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported bill list '{}': {} participants, {} transactions",
                    snapshot.bill_list.title,
                    snapshot.bill_list.participants.len(),
                    snapshot.bill_list.transactions.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: transactions, balance, full",
                export_type
            );
        }
    }

    Ok(())
}

fn print_bill_list(bill_list: &BillList) {
    println!("Bill list: {}", bill_list.title);
    println!("  ID:           {}", bill_list.id);
    println!(
        "  Created:      {}",
        bill_list.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if bill_list.participants.is_empty() {
        println!("  Participants: (none)");
    } else {
        println!(
            "  Participants: {}",
            format_split(&bill_list.participant_names())
        );
    }
    println!();
    if bill_list.transactions.is_empty() {
        println!("No transactions yet.");
    } else {
        print_transactions(&bill_list.transactions);
    }
}

fn print_transactions(transactions: &[Transaction]) {
    println!(
        "{:<6} {:>12} {:<16} {:<24} SPLIT",
        "ID", "AMOUNT", "PAYER", "FOR"
    );
    println!("{}", "-".repeat(80));
    for t in transactions {
        println!(
            "{:<6} {:>12} {:<16} {:<24} {}",
            t.id,
            format_cents(t.amount_cents),
            truncate(&t.payer, 16),
            truncate(&t.whatfor, 24),
            format_split(&t.split_between)
        );
    }
}

fn print_balance(matrix: &BalanceMatrix) {
    if matrix.is_empty() {
        println!("No participants.");
        return;
    }

    let names: Vec<&str> = matrix.names().collect();
    print!("{:<16}", "");
    for name in &names {
        print!(" {:>12}", truncate(name, 12));
    }
    println!();
    for (creditor, row) in matrix.rows() {
        print!("{:<16}", truncate(creditor, 16));
        for amount in row.values() {
            print!(" {:>12}", format_cents(*amount));
        }
        println!();
    }

    println!();
    if matrix.is_settled() {
        println!("Everyone is settled up.");
        return;
    }
    for name in names {
        match matrix.net_position(name).unwrap_or(0) {
            net if net > 0 => println!("{} is owed {}", name, format_cents(net)),
            net if net < 0 => println!("{} owes {}", name, format_cents(-net)),
            _ => println!("{} is even", name),
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}
