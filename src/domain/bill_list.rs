use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Transaction;

pub type BillListId = i64;
pub type ParticipantId = i64;

/// A named party within one bill list. Names are unique per list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub bill_list_id: BillListId,
}

/// A group of participants and the expenses recorded among them.
/// Participants and transactions live and die with their list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillList {
    pub id: BillListId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
    pub transactions: Vec<Transaction>,
}

impl BillList {
    pub fn participant_names(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.name.clone()).collect()
    }

    pub fn has_participant(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p.name == name)
    }
}

/// Check a participant name before it is stored.
///
/// Names end up inside the comma-delimited split form, so they may not be
/// blank, padded, or contain a comma.
pub fn validate_participant_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("participant name cannot be blank".to_string());
    }
    if name.trim() != name {
        return Err(format!(
            "participant name '{}' has leading or trailing whitespace",
            name
        ));
    }
    if name.contains(',') {
        return Err(format!("participant name '{}' cannot contain a comma", name));
    }
    Ok(())
}

/// Find the first name that appears more than once.
pub fn first_duplicate_name<S: AsRef<str>>(names: &[S]) -> Option<&str> {
    names.iter().enumerate().find_map(|(i, name)| {
        names[..i]
            .iter()
            .any(|earlier| earlier.as_ref() == name.as_ref())
            .then(|| name.as_ref())
    })
}
