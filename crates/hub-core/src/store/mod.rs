//! Durable state: tasks, contexts, sessions, and settings.
//!
//! Each store owns one JSON file (or one file per record, for sessions),
//! guarded by its own lock and written atomically via temp+rename. No
//! file is ever shared across stores.

mod context;
mod session;
mod settings;
mod task;

pub use context::{ContextRecord, ContextStore};
pub use session::{Session, SessionEntry, SessionRole, SessionStore};
pub use settings::{Settings, SettingsStore, SettingsUpdate};
pub use task::{TaskFilter, TaskStore};
