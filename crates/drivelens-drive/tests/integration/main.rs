//! Integration tests for drivelens-drive
//!
//! Uses wiremock to simulate the Drive v3 API and verifies end-to-end
//! behavior of folder listing, byte download, and thumbnail resolution.

mod common;

mod test_thumbnails;
