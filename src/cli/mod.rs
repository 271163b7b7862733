use crate::core::task_manager::DisplayMode;
use crate::models::{CliSettings, OpSettings, Override};
use clap::{ArgAction, Parser};
use std::num::NonZeroUsize;

pub mod dispatcher;

/// Builds the colour-aware help string from the message catalogue.
fn build_help_string() -> &'static str {
    let use_colors = colored::control::SHOULD_COLORIZE.should_colorize();

    let template = t!("cli.help.template");

    let title = if use_colors { "\x1b[1;33m" } else { "" }; // Bold Yellow
    let hl = if use_colors { "\x1b[1;36m" } else { "" }; // Bold Cyan
    let cmd = if use_colors { "\x1b[36m" } else { "" }; // Cyan
    let err = if use_colors { "\x1b[91m" } else { "" }; // Bright Red
    let dim = if use_colors { "\x1b[2m" } else { "" };
    let reset = if use_colors { "\x1b[0m" } else { "" };

    let formatted_string = template
        .replace("<title>", title)
        .replace("</title>", reset)
        .replace("<hl>", hl)
        .replace("</hl>", reset)
        .replace("<cmd>", cmd)
        .replace("</cmd>", reset)
        .replace("<err>", err)
        .replace("</err>", reset)
        .replace("<dim>", dim)
        .replace("</dim>", reset);

    Box::leak(formatted_string.into_boxed_str())
}

/// vx: scaffolds, removes and initializes apps of a JavaScript monorepo.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    help_template = { build_help_string() },
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// `generate`, `delete` or `init` (or one of their aliases).
    pub command: Option<String>,

    /// Template name or path.
    #[arg(short, long)]
    pub template: Option<String>,

    /// Name of the app or project.
    #[arg(short, long)]
    pub name: Option<String>,

    /// Workspace the app lives in (`root` for the project root).
    #[arg(short, long)]
    pub workspace: Option<String>,

    /// Ask for confirmation before acting.
    #[arg(long, default_value_t = true, action = ArgAction::Set, value_name = "BOOL")]
    pub confirm: bool,

    /// Same as `--confirm false`.
    #[arg(long)]
    pub no_confirm: bool,

    /// Maximum number of files copied or deleted at once.
    #[arg(long)]
    pub concurrency: Option<NonZeroUsize>,

    /// Run as if started in this directory.
    #[arg(long)]
    pub dir: Option<String>,

    /// Do not ask anything; use flags and defaults.
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Author written by `init`.
    #[arg(short, long)]
    pub author: Option<String>,

    /// Author email written by `init`.
    #[arg(short, long)]
    pub email: Option<String>,
}

impl Cli {
    /// Operation settings equivalent to these flags.
    pub fn settings(&self) -> OpSettings {
        OpSettings {
            cli: CliSettings {
                template: self.template.clone(),
                name: self.name.clone(),
                workspace: self.workspace.clone(),
                confirm: self.confirm && !self.no_confirm,
                concurrency: self.concurrency,
                dir: self.dir.clone(),
                author: self.author.clone(),
                email: self.email.clone(),
            },
            overrides: Override {
                use_default: self.yes,
                disable_confirm: false,
            },
            root: None,
            home: None,
            display: DisplayMode::Auto,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_settings() {
        let cli = Cli::try_parse_from([
            "vx",
            "generate",
            "-t",
            "with-node",
            "-n",
            "my-app",
            "-w",
            "packages",
            "--confirm",
            "false",
            "--concurrency",
            "4",
        ])
        .unwrap();

        let settings = cli.settings();

        assert_eq!(cli.command.as_deref(), Some("generate"));
        assert_eq!(settings.cli.template.as_deref(), Some("with-node"));
        assert_eq!(settings.cli.workspace.as_deref(), Some("packages"));
        assert!(!settings.cli.confirm);
        assert_eq!(settings.cli.concurrency, NonZeroUsize::new(4));
        assert!(!settings.overrides.use_default);
    }

    #[test]
    fn confirm_defaults_to_true() {
        let cli = Cli::try_parse_from(["vx", "init", "-y"]).unwrap();
        assert!(cli.settings().cli.confirm);
        assert!(cli.settings().overrides.use_default);

        let cli = Cli::try_parse_from(["vx", "init", "--no-confirm"]).unwrap();
        assert!(!cli.settings().cli.confirm);
    }

    #[test]
    fn help_template_leaves_no_markup_behind() {
        let help = build_help_string();
        for tag in ["title", "hl", "cmd", "err", "dim"] {
            assert!(!help.contains(&format!("<{tag}>")), "<{tag}> left in help");
            assert!(!help.contains(&format!("</{tag}>")), "</{tag}> left in help");
        }
        assert!(help.contains("<command>"));
        assert!(help.contains("{options}"));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(Cli::try_parse_from(["vx", "delete", "--concurrency", "0"]).is_err());
    }
}
