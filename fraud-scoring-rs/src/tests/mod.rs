//! Crate-level tests
//!
//! Unit tests live next to the code they cover; these exercise several
//! components together.

pub mod pipeline_tests;
