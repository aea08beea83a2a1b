//! `request` handler: one raw call through the dispatcher.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use optwire_api::RequestOptions;

use super::{Context, util};
use crate::cli::{GlobalOpts, RequestArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct Reply {
    status: u16,
    data: Value,
}

pub async fn handle(ctx: &Context, args: RequestArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let data = util::request_data(&args.params, args.body.as_deref())?;
    let registry = ctx.registry()?;
    let api = registry
        .get(&args.api, None)
        .map_err(|e| CliError::api(&args.api, e))?;

    let options = RequestOptions {
        target: args.target,
        path: args.path,
        ..RequestOptions::default()
    };
    let response = api
        .request(args.verb, options, data)
        .await
        .map_err(|e| CliError::api(&args.api, e))?;

    let reply = Reply {
        status: response.status,
        data: response.data,
    };
    let color = ctx.color;
    let out = output::render_single(&global.output, &reply, |r| {
        let mut text = output::muted(&format!("HTTP {}", r.status), color);
        let body = serde_json::to_string_pretty(&r.data).unwrap_or_default();
        let _ = write!(text, "\n{body}");
        text
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
