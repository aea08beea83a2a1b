//! Config subcommand handlers.

use std::fmt::Write as _;

use optwire_config::{AuthMode, Config};

use super::Context;
use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

/// Format config for display, masking sensitive values.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    if let Some(ref agent) = cfg.defaults.user_agent {
        let _ = writeln!(out, "user_agent = \"{agent}\"");
    }
    if let Some(ref ca) = cfg.defaults.ca_cert {
        let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
    }

    for (name, api) in &cfg.apis {
        let _ = writeln!(out);
        let _ = writeln!(out, "[apis.{name}]");
        let _ = writeln!(out, "url = \"{}\"", api.url);
        for header in api.headers.keys() {
            let _ = writeln!(out, "headers.{header} = \"****\"");
        }
        let auth = &api.auth;
        match auth.mode {
            AuthMode::None => {}
            AuthMode::Headers => {
                let _ = writeln!(out, "auth.mode = \"headers\"");
                for header in auth.headers.keys() {
                    let _ = writeln!(out, "auth.headers.{header} = \"****\"");
                }
            }
            AuthMode::Token => {
                let _ = writeln!(out, "auth.mode = \"token\"");
                if let Some(ref url) = auth.token_url {
                    let _ = writeln!(out, "auth.token_url = \"{url}\"");
                }
                if let Some(ref user) = auth.username {
                    let _ = writeln!(out, "auth.username = \"{user}\"");
                }
                if let Some(ref env) = auth.password_env {
                    let _ = writeln!(out, "auth.password_env = \"{env}\"");
                }
                if auth.password.is_some() {
                    let _ = writeln!(out, "auth.password = \"****\"");
                }
            }
        }
    }

    for (name, field) in &cfg.fields {
        let _ = writeln!(out);
        let _ = writeln!(out, "[fields.{name}]");
        let _ = writeln!(out, "api = \"{}\"", field.api);
        if let Some(ref target) = field.target {
            let _ = writeln!(out, "target = \"{target}\"");
        }
        if let Some(ref path) = field.path {
            let _ = writeln!(out, "path = \"{path}\"");
        }
        let _ = writeln!(out, "lookup_key = \"{}\"", field.lookup_key);
        let _ = writeln!(out, "page_size = {}", field.page_size);
        let _ = writeln!(out, "multiple = {}", field.multiple);
    }

    out
}

pub fn handle(ctx: &Context, args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&ctx.path.display().to_string(), global.quiet);
            Ok(())
        }
        ConfigCommand::Show => {
            let out = format_config_redacted(&ctx.config);
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }
    }
}
