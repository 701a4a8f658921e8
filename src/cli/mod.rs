pub mod commands;
pub mod output;

pub use commands::{Cli, Commands};
pub use output::{print_error, print_info, print_success, print_table};
