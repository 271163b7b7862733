use anyhow::Result;
use thiserror::Error;

use crate::{
    cli::Cli,
    core::task_manager::RenderSummary,
    models::OpSettings,
    operations::{Operation, OperationError},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UsageError {
    #[error("These are the allowed commands:\n{0}")]
    UnknownCommand(String),
}

/// A command, its aliases and how to build its operation.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    build: fn(OpSettings) -> Result<Operation, OperationError>,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "generate",
        aliases: &["gen", "g"],
        build: Operation::generate,
    },
    CommandDefinition {
        name: "delete",
        aliases: &["del", "rm"],
        build: Operation::delete,
    },
    CommandDefinition {
        name: "init",
        aliases: &["new"],
        build: Operation::init,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn usage_error() -> UsageError {
    let list = COMMAND_REGISTRY
        .iter()
        .map(|cmd| format!("    - {}", cmd.name))
        .collect::<Vec<_>>()
        .join("\n");
    UsageError::UnknownCommand(list)
}

/// Resolves `name` to an operation built from `settings`.
pub fn build_operation(name: Option<&str>, settings: OpSettings) -> Result<Operation> {
    let command = name.and_then(find_command).ok_or_else(usage_error)?;
    Ok((command.build)(settings)?)
}

/// Runs the command selected on the command line through its whole lifecycle.
pub async fn dispatch(cli: Cli) -> Result<RenderSummary> {
    log::debug!("Dispatching: {:?}", cli);
    let mut operation = build_operation(cli.command.as_deref(), cli.settings())?;
    Ok(operation.run().await?)
}

/// The error message followed by every cause in its chain not already spelled out in it.
pub fn error_report(error: &anyhow::Error) -> String {
    let mut report = error.to_string();
    for cause in error.chain().skip(1) {
        let cause = cause.to_string();
        if !report.contains(&cause) {
            report.push_str(": ");
            report.push_str(&cause);
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Command;
    use anyhow::{Context, anyhow};

    #[test]
    fn error_report_keeps_the_cause_chain_once() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = Err::<(), _>(io).context("Could not copy a.txt").unwrap_err();
        assert_eq!(error_report(&err), "Could not copy a.txt: denied");

        let err = anyhow!(OperationError::Validation(
            crate::operations::ValidationError::AppNotFound
        ));
        assert_eq!(error_report(&err), "App does not exist");
    }

    #[test]
    fn aliases_resolve_to_their_command() {
        for (alias, command) in [
            ("g", Command::Generate),
            ("gen", Command::Generate),
            ("rm", Command::Delete),
            ("del", Command::Delete),
            ("new", Command::Init),
            ("init", Command::Init),
        ] {
            let dir = tempfile::tempdir().unwrap();
            let settings = OpSettings {
                root: Some(dir.path().to_path_buf()),
                ..Default::default()
            };
            let operation = build_operation(Some(alias), settings).unwrap();
            assert_eq!(operation.command(), command, "alias {alias}");
        }
    }

    #[test]
    fn unknown_or_missing_commands_list_the_allowed_ones() {
        for name in [Some("launch"), None] {
            let err = build_operation(name, OpSettings::default()).unwrap_err();
            assert_eq!(
                err.to_string(),
                "These are the allowed commands:\n    - generate\n    - delete\n    - init"
            );
        }
    }
}
