//! Multi-source record aggregation and the consolidated table

pub mod aggregator;
pub mod derived;
pub mod table;
pub mod writer;

pub use aggregator::{PollSummary, RecordAggregator};
pub use table::RecordTable;
pub use writer::{render_table, write_table};
