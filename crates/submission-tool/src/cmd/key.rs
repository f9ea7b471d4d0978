use anyhow::{Context, Result};
use clap::Subcommand;
use submission_model::{FormVersion, SubmissionKey, SubmissionKeyPart};

#[derive(Subcommand, Debug, Clone)]
pub enum KeyCommand {
    /// Split a submission key into its segments (JSON)
    Parse {
        /// Key such as `form[@version=1 and @uiVersion=null]/data[@key=uuid:..]`
        key: String,
    },
    /// Render the top-level key of one submission
    Build {
        form_id: String,
        /// Instance id of the submission
        #[arg(long, value_name = "ID")]
        instance: String,
        /// Name of the form's top-level group
        #[arg(long, default_value = "data")]
        top: String,
        #[arg(long)]
        model_version: Option<i64>,
        #[arg(long)]
        ui_version: Option<i64>,
    },
}

pub fn run(command: KeyCommand) -> Result<()> {
    match command {
        KeyCommand::Parse { key } => {
            let parts = SubmissionKey::new(key.as_str())
                .parts()
                .with_context(|| format!("cannot parse `{key}`"))?;
            println!("{}", serde_json::to_string_pretty(&parts)?);
        }
        KeyCommand::Build {
            form_id,
            instance,
            top,
            model_version,
            ui_version,
        } => {
            let key = SubmissionKey::from_parts(&[
                SubmissionKeyPart::form(
                    form_id,
                    FormVersion {
                        model_version,
                        ui_version,
                    },
                ),
                SubmissionKeyPart::element(top).with_auri(instance),
            ]);
            println!("{key}");
        }
    }
    Ok(())
}
