use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use submission_engine::{FormRegistry, Submission};
use submission_store::{InMemoryStore, RowKey};
use tracing::info;

use super::{load_definition, load_limits};

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Form definition (JSON)
    #[arg(value_name = "DEFINITION")]
    pub definition: PathBuf,
    /// Store limits (TOML); built-in defaults apply when absent
    #[arg(long, value_name = "FILE")]
    pub limits: Option<PathBuf>,
    /// Top-level value, repeatable
    #[arg(long = "value", value_name = "NAME=VALUE", value_parser = parse_assignment)]
    pub values: Vec<(String, String)>,
    /// Instance id; a uuid is generated when absent
    #[arg(long, value_name = "ID")]
    pub instance_id: Option<String>,
    /// Mark the submission complete before persisting
    #[arg(long)]
    pub complete: bool,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got `{raw}`"))
}

pub fn run(args: &SubmitArgs) -> Result<()> {
    let definition = load_definition(&args.definition)?;
    let limits = load_limits(args.limits.as_deref())?;
    let store = InMemoryStore::new();
    let registry = FormRegistry::new(limits);
    let form = registry.register(&definition, &store)?;

    let mut submission = Submission::create(
        Arc::clone(&form),
        &store,
        args.instance_id.clone().map(RowKey::new),
    )?;
    for (name, raw) in &args.values {
        let element = submission
            .element_id(name)
            .with_context(|| format!("form `{}` has no element `{name}`", form.form_id))?;
        submission
            .set_value_from_string(element, raw)
            .with_context(|| format!("invalid value for `{name}`"))?;
    }
    if args.complete {
        submission.mark_complete()?;
    }
    submission.persist(&store)?;
    info!(rows = store.total_rows(), "persisted submission");

    println!("{}", submission.key());
    for table in form.schema.tables() {
        let rows = store.row_count(&table.name);
        if rows > 0 {
            println!("  {:<48} rows={rows}", table.name.to_string());
        }
    }
    Ok(())
}
