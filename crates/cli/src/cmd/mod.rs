mod serve;
mod status;

pub use serve::{ServeOverrides, cmd_serve};
pub use status::cmd_status;
