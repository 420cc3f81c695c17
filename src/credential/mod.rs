//! API key 池：分发器、持久化与每日重置。

pub mod dispatcher;
pub mod reset_task;
pub mod store;
pub mod types;

pub use dispatcher::{DispatchError, KeyDispatcher};
pub use types::{Credential, KeyStats, OperationKind, QuotaCostTable};
