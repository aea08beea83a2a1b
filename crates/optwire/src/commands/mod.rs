//! Command dispatch: bridges CLI args -> registry/engine -> output formatting.

pub mod apis;
pub mod config_cmd;
pub mod directory;
pub mod options;
pub mod request;
pub mod util;

use std::path::PathBuf;

use optwire_api::ApiRegistry;
use optwire_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Loaded configuration plus CLI overrides, shared by all handlers.
pub struct Context {
    pub path: PathBuf,
    pub config: Config,
    pub color: bool,
}

impl Context {
    pub fn load(global: &GlobalOpts) -> Result<Self, CliError> {
        let path = global.config.clone().unwrap_or_else(optwire_config::config_path);
        let mut config = optwire_config::load_config(Some(&path))
            .map_err(|e| CliError::config(&path, e))?;

        if let Some(timeout) = global.timeout {
            config.defaults.timeout = timeout;
        }
        if global.insecure {
            config.defaults.insecure = true;
        }

        Ok(Self {
            path,
            config,
            color: output::should_color(&global.color),
        })
    }

    /// Build a registry from the configured APIs. Credentials are resolved
    /// here, so only commands that dispatch calls pay for it.
    pub fn registry(&self) -> Result<ApiRegistry, CliError> {
        optwire_config::build_registry(&self.config).map_err(|e| CliError::config(&self.path, e))
    }
}

/// Dispatch a command to its handler.
pub async fn dispatch(cmd: Command, ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Apis => apis::handle(ctx, global),
        Command::Directory(args) => directory::handle(ctx, args, global).await,
        Command::Request(args) => request::handle(ctx, args, global).await,
        Command::Options(args) => options::handle(ctx, args, global).await,
        Command::Config(args) => config_cmd::handle(ctx, args, global),
        Command::Completions(_) => Ok(()),
    }
}
