//! `apis` handler.

use serde::Serialize;
use tabled::Tabled;

use optwire_config::{ApiProfile, AuthMode};

use super::Context;
use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ApiSummary<'a> {
    name: &'a str,
    url: &'a str,
    flavor: &'static str,
    auth: &'static str,
    fields: Vec<&'a str>,
}

#[derive(Tabled)]
struct ApiRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Flavor")]
    flavor: String,
    #[tabled(rename = "Auth")]
    auth: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

fn auth_label(profile: &ApiProfile) -> &'static str {
    match profile.auth.mode {
        AuthMode::None => "none",
        AuthMode::Headers => "headers",
        AuthMode::Token => "token",
    }
}

fn flavor_label(profile: &ApiProfile) -> &'static str {
    match profile.flavor {
        optwire_api::ApiFlavor::Rest => "rest",
        optwire_api::ApiFlavor::StaticJson => "static_json",
    }
}

pub fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let summaries: Vec<ApiSummary<'_>> = ctx
        .config
        .apis
        .iter()
        .map(|(name, profile)| ApiSummary {
            name,
            url: &profile.url,
            flavor: flavor_label(profile),
            auth: auth_label(profile),
            fields: ctx
                .config
                .fields
                .iter()
                .filter(|(_, field)| field.api == *name)
                .map(|(field, _)| field.as_str())
                .collect(),
        })
        .collect();

    let color = ctx.color;
    let out = output::render_list(
        &global.output,
        &summaries,
        |s| ApiRow {
            name: output::accent(s.name, color),
            url: s.url.to_owned(),
            flavor: s.flavor.to_owned(),
            auth: s.auth.to_owned(),
            fields: s.fields.join(", "),
        },
        |s| s.name.to_owned(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
