//! `options` handler: bind a configured field and page through it.

use serde::Serialize;
use tabled::Tabled;
use tracing::debug;

use optwire_core::{CoreError, LoadOutcome, OptionEntry, RemoteField};

use super::Context;
use crate::cli::{GlobalOpts, OptionsArgs};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct Row {
    #[serde(flatten)]
    entry: OptionEntry,
    selected: bool,
}

#[derive(Tabled)]
struct OptionRow {
    #[tabled(rename = "")]
    mark: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
}

fn to_row(row: &Row, color: bool) -> OptionRow {
    match &row.entry {
        OptionEntry::Choice(option) => OptionRow {
            mark: if row.selected { "*".into() } else { String::new() },
            id: option.id.clone(),
            name: option.name.clone(),
        },
        other => OptionRow {
            mark: String::new(),
            id: String::new(),
            name: output::muted(other.text(), color),
        },
    }
}

/// Keep the first fetch failure; the rows already show it.
fn note_failure(outcome: LoadOutcome, failure: &mut Option<optwire_api::Error>) {
    debug!(?outcome, "load finished");
    if let LoadOutcome::Failed { error, .. } = outcome {
        failure.get_or_insert(error);
    }
}

pub async fn handle(ctx: &Context, args: OptionsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config = ctx
        .config
        .field(&args.field)
        .map_err(|e| CliError::config(&ctx.path, e))?;
    let api_name = config.api.clone();
    let registry = ctx.registry()?;

    let values: Vec<&str> = args.value.iter().map(String::as_str).collect();
    let api_error = |e: CoreError| match e {
        CoreError::Api(err) => CliError::api(&api_name, err),
        other => other.into(),
    };
    let (field, outcome) = RemoteField::bind(&registry, &args.field, config, &values)
        .await
        .map_err(api_error)?;

    let mut failure = None;
    note_failure(outcome, &mut failure);

    if let Some(term) = args.search.as_deref() {
        note_failure(field.search(term).await.map_err(api_error)?, &mut failure);
    }

    for _ in 0..args.more {
        match field.load_more().await {
            Ok(outcome) => note_failure(outcome, &mut failure),
            Err(e) if e.is_noop() => {
                debug!(reason = %e, "stopped paging");
                break;
            }
            Err(e) => return Err(api_error(e)),
        }
    }

    let selection = field.engine().selection();
    let selected = selection.values();
    let rows: Vec<Row> = field
        .engine()
        .snapshot()
        .iter()
        .filter(|entry| args.all || entry.is_selectable())
        .map(|entry| Row {
            selected: entry.choice().is_some_and(|c| selected.contains(&c.id.as_str())),
            entry: entry.clone(),
        })
        .collect();
    field.unbind();

    let color = ctx.color;
    let out = output::render_list(
        &global.output,
        &rows,
        |r| to_row(r, color),
        |r| match &r.entry {
            OptionEntry::Choice(option) => format!("{}\t{}", option.id, option.name),
            other => other.text().to_owned(),
        },
    );
    output::print_output(&out, global.quiet);

    match failure {
        Some(err) => Err(CliError::api(&api_name, err)),
        None => Ok(()),
    }
}
