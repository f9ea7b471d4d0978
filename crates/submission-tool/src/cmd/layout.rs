use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use submission_model::{CompiledForm, TableRole};

use super::{load_definition, load_limits, render_version};

#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Form definition (JSON)
    #[arg(value_name = "DEFINITION")]
    pub definition: PathBuf,
    /// Store limits (TOML); built-in defaults apply when absent
    #[arg(long, value_name = "FILE")]
    pub limits: Option<PathBuf>,
    /// Print the compiled layout as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &LayoutArgs) -> Result<()> {
    let definition = load_definition(&args.definition)?;
    let limits = load_limits(args.limits.as_deref())?;
    let form = CompiledForm::compile(&definition, &limits)
        .with_context(|| format!("failed to compile {}", args.definition.display()))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&form)?);
        return Ok(());
    }

    println!(
        "{} (model {}, ui {})",
        form.form_id,
        render_version(form.version.model_version),
        render_version(form.version.ui_version)
    );
    println!("tables:");
    for table in form.schema.tables() {
        let parent = table
            .parent
            .map_or_else(|| "-".to_string(), |parent| form.schema.table(parent).name.to_string());
        println!(
            "  {:<48} {:<18} columns={:<4} parent={parent}",
            table.name.to_string(),
            role_label(table.role),
            table.column_count()
        );
    }
    println!("elements:");
    for element in form.elements.elements() {
        println!(
            "  {:<48} {:?}",
            form.elements.element_key(element.id).to_string(),
            element.element_type
        );
    }
    Ok(())
}

fn role_label(role: TableRole) -> &'static str {
    match role {
        TableRole::TopLevel => "top_level",
        TableRole::Repeat => "repeat",
        TableRole::Phantom => "phantom",
        TableRole::SelectChoice => "select_choice",
        TableRole::BinaryContent => "binary_content",
        TableRole::BinaryContentRef => "binary_content_ref",
        TableRole::RefBlob => "ref_blob",
        TableRole::LongString => "long_string",
    }
}
