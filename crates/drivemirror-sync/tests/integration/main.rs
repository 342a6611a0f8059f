//! Integration tests for drivemirror-sync
//!
//! The engines, the service and the orchestrator are exercised end to end
//! against an in-memory mirror store and a scripted lister.

mod common;
mod test_crawl;
mod test_incremental;
