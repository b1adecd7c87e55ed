//! Well-known names shared across the service.

pub const APP_NAME: &str = "buildslot";

/// Media types accepted by the build endpoint.
pub const SUPPORTED_BUILD_CONTENT_TYPES: &[&str] = &["application/x-tar"];

/// Tar entry carrying the [`BuildControl`](crate::control::BuildControl) document.
pub const CONTROL_ENTRY: &str = "control.json";

/// Tar entry carrying the opaque build manifest.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// Prefix every source entry in a build request must live under.
pub const STORE_PREFIX: &str = "store/";

/// Name of the single build directory inside the build base directory.
pub const BUILD_DIR_NAME: &str = "build";

pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const LOG_FILENAME: &str = "build.log";
pub const STORE_DIR: &str = "store";
pub const OUTPUT_DIR: &str = "output";

/// Packaged output of a finished build, placed inside [`OUTPUT_DIR`].
pub const ARTIFACT_NAME: &str = "output.tar";

/// Result marker, stored next to the build directory.
pub const RESULT_FILENAME: &str = "result.json";

pub const DEFAULT_TOOL: &str = "osbuild";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8001";
