pub mod account;
pub mod entry;
pub mod money;

pub use account::{Account, AccountStatus, AccountView, Role};
pub use entry::{EntryKind, EntryStatus, EntryView, TransactionEntry};
pub use money::MoneyError;
