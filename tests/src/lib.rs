//! # PX Admission Gateway Test Suite
//!
//! End-to-end flows through the gateway router.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs   # Partners, collaborators and handlers shared by flows
//!     └── flows.rs      # Request flows through the full middleware stack
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p px-tests
//! cargo test -p px-tests integration::flows::
//! ```

#![allow(dead_code)]

pub mod integration;
