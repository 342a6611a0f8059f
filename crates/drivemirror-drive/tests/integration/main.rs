//! Integration tests for drivemirror-drive
//!
//! Uses wiremock to simulate the Drive v3 API and the OAuth token endpoint,
//! and verifies end-to-end behavior of the DriveLister: paging, change
//! feeds, token acquisition and error classification.

mod common;

mod test_auth;
mod test_changes;
