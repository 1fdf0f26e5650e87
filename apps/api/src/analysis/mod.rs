//! CV analysis: upload validation, the scoring-oracle client, persistence and
//! the credit-gated workflow that ties them together.

pub mod handlers;
pub mod scorer;
pub mod store;
pub mod upload;
pub mod workflow;
