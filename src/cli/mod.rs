pub mod commands;
pub mod handlers;

pub use commands::{CliArgs, Commands};
pub use handlers::handle_command;
