pub mod history;
pub mod model;

pub use history::{HistoryEntry, collect_history};
pub use model::{Timestamp, Transaction};
