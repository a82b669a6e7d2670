pub mod sheets;
pub mod terminal;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::ActivityError;
use crate::model::LogRow;

/// Append-only sink for interaction records.
pub trait ActivityLog: Send + Sync {
    fn append(&self, row: LogRow) -> BoxFuture<'_, Result<(), Report<ActivityError>>>;
}
