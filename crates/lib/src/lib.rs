//! buildslot-lib: a single-build service.
//!
//! A client POSTs one tar stream carrying build parameters, a manifest and
//! the sources the build needs. The service validates and unpacks it into a
//! build directory that can be claimed exactly once, runs the build tool,
//! streams its output back live and packages whatever the tool produced.
//!
//! - [`archive`]: request validation and unpacking
//! - [`admission`]: the once-only build slot
//! - [`execute`]: tool execution, transcript and packaging
//! - [`server`]: the HTTP surface

pub mod admission;
pub mod archive;
pub mod config;
pub mod consts;
pub mod control;
pub mod execute;
pub mod result;
pub mod server;
pub mod service;
pub mod util;
