mod bill_list;
mod ledger;
mod money;
mod split;
mod transaction;
mod user;

pub use bill_list::*;
pub use ledger::*;
pub use money::*;
pub use split::*;
pub use transaction::*;
pub use user::*;
