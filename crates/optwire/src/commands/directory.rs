//! `directory` handler.

use serde::Serialize;
use tabled::Tabled;

use super::Context;
use crate::cli::{DirectoryArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct Entry {
    name: String,
    url: String,
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "URL")]
    url: String,
}

pub async fn handle(ctx: &Context, args: DirectoryArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let registry = ctx.registry()?;
    let client = registry
        .client(&args.api)
        .map_err(|e| CliError::api(&args.api, e))?;
    let entries = client
        .resolve_directory()
        .await
        .map_err(|e| CliError::api(&args.api, e))?;

    let mut listing: Vec<Entry> = entries
        .iter()
        .map(|(name, url)| Entry {
            name: name.clone(),
            url: url.to_string(),
        })
        .collect();
    listing.sort_by(|a, b| a.name.cmp(&b.name));

    let color = ctx.color;
    let out = output::render_list(
        &global.output,
        &listing,
        |e| EntryRow {
            name: output::accent(&e.name, color),
            url: e.url.clone(),
        },
        |e| format!("{}\t{}", e.name, e.url),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
