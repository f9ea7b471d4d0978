use anyhow::Result;
use clap::Args;
use submission_model::{FormDefinition, StoreLimits};

#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    /// Emit the store limits schema instead of the form definition schema
    #[arg(long)]
    pub limits: bool,
}

pub fn run(args: &SchemaArgs) -> Result<()> {
    let schema = if args.limits {
        schemars::schema_for!(StoreLimits)
    } else {
        schemars::schema_for!(FormDefinition)
    };
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
