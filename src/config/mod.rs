mod config_file;
mod server_config;

pub use config_file::*;
pub use server_config::*;
