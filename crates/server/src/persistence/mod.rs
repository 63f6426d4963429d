use sqlx::SqlitePool;

pub mod events;
pub mod honeypots;
pub mod migrations;

pub type Db = SqlitePool;

pub use events::{EventFilters, EventRecord, NewEvent};
pub use honeypots::{HoneypotRecord, NewHoneypot, UpdatedHoneypot};
pub use migrations::{MigrationLabel, MigrationSnapshot};
