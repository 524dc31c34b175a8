//! Test utilities and fixtures for Slipway unit tests.

pub mod fixtures;

pub use fixtures::{evaluate_tree, BuildTree, TEST_HOST_ABI};
