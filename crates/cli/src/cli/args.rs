pub use clap::Parser;

use std::path::PathBuf;

use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "binstore")]
#[command(about = "Content-addressed binary store")]
#[command(version)]
pub struct Args {
    /// Path to the config file (defaults to ~/.binstore/binstore.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Default log level; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: LevelFilter,

    #[command(subcommand)]
    pub command: crate::Command,
}
