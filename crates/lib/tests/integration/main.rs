//! End-to-end tests driving a real server over HTTP.

mod build_tests;
mod common;
