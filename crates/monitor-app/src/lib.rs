pub mod cli;
pub mod config;
pub mod credentials;
pub mod runtime;

pub use cli::CliArgs;
pub use config::MonitorConfig;
pub use credentials::{load_credentials, parse_credentials, Credentials, CredentialsError};
