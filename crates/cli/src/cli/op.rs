use std::error::Error;
use std::path::{Path, PathBuf};

use binstore::{BinaryManager, BinaryStoreConfig, BinaryStoreError, CONFIG_FILE_NAME};

pub const APP_DIR_NAME: &str = ".binstore";

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no home directory found; pass --config")]
    NoHomeDirectory,
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no config at {0}; run `binstore init` first")]
    NotInitialized(PathBuf),
    #[error(transparent)]
    Store(#[from] BinaryStoreError),
}

/// Resolve the config file path: explicit `--config` > `~/.binstore/binstore.toml`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, ContextError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let home = dirs::home_dir().ok_or(ContextError::NoHomeDirectory)?;
    Ok(home.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

#[derive(Clone, Debug)]
pub struct OpContext {
    /// Config file every command reads (and `init` writes)
    pub config_path: PathBuf,
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ContextError> {
        Ok(Self {
            config_path: resolve_config_path(config_path)?,
        })
    }

    /// Directory holding the config file; `init` puts the store beside it by default.
    pub fn base_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn load_config(&self) -> Result<BinaryStoreConfig, LoadError> {
        if !self.config_path.exists() {
            return Err(LoadError::NotInitialized(self.config_path.clone()));
        }
        Ok(BinaryStoreConfig::load(&self.config_path)?)
    }

    pub async fn manager(&self) -> Result<BinaryManager, LoadError> {
        let config = self.load_config()?;
        Ok(BinaryManager::from_config(&config).await?)
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
