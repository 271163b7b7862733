// src/operations/steps.rs

//! Question sets asked by each operation before validating, and the prompt backends.

use super::OperationError;
use crate::models::CliSettings;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;

/// An entry of a select question: what is shown and what is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub label: String,
    pub value: String,
}

impl Choice {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }

    /// A choice whose label is also its value.
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self::new(value.clone(), value)
    }
}

type MessageFn = Box<dyn Fn(&Answers) -> String>;

/// One interactive question. Questions with `when == false` are skipped.
pub enum Question {
    Select {
        name: &'static str,
        message: String,
        choices: Vec<Choice>,
        when: bool,
    },
    Input {
        name: &'static str,
        message: String,
        default: Option<String>,
        when: bool,
    },
    /// A yes/no question; answering no cancels the operation.
    Confirm {
        name: &'static str,
        message: MessageFn,
        when: bool,
    },
}

impl fmt::Debug for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select { name, choices, when, .. } => f
                .debug_struct("Select")
                .field("name", name)
                .field("choices", choices)
                .field("when", when)
                .finish(),
            Self::Input { name, default, when, .. } => f
                .debug_struct("Input")
                .field("name", name)
                .field("default", default)
                .field("when", when)
                .finish(),
            Self::Confirm { name, when, .. } => f
                .debug_struct("Confirm")
                .field("name", name)
                .field("when", when)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Text(String),
    Confirm(bool),
}

/// Answers collected so far, keyed by question name.
#[derive(Debug, Clone, Default)]
pub struct Answers(HashMap<&'static str, Answer>);

impl Answers {
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(Answer::Text(value)) => Some(value),
            _ => None,
        }
    }

    pub fn confirmed(&self, name: &str) -> Option<bool> {
        match self.0.get(name) {
            Some(Answer::Confirm(value)) => Some(*value),
            _ => None,
        }
    }

    fn insert(&mut self, name: &'static str, answer: Answer) {
        self.0.insert(name, answer);
    }
}

/// Backend that actually asks the questions.
pub trait Prompter: fmt::Debug {
    /// Returns the index of the chosen item.
    fn select(&mut self, message: &str, items: &[String], default: usize) -> Result<usize, dialoguer::Error>;
    fn input(&mut self, message: &str, default: Option<&str>) -> Result<String, dialoguer::Error>;
    fn confirm(&mut self, message: &str) -> Result<bool, dialoguer::Error>;
}

/// Terminal prompts.
#[derive(Debug, Default)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn select(&mut self, message: &str, items: &[String], default: usize) -> Result<usize, dialoguer::Error> {
        let theme = ColorfulTheme::default();
        Select::with_theme(&theme)
            .with_prompt(message)
            .items(items)
            .default(default)
            .interact()
    }

    fn input(&mut self, message: &str, default: Option<&str>) -> Result<String, dialoguer::Error> {
        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme).with_prompt(message);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input.interact_text()
    }

    fn confirm(&mut self, message: &str) -> Result<bool, dialoguer::Error> {
        let theme = ColorfulTheme::default();
        Confirm::with_theme(&theme)
            .with_prompt(message)
            .default(true)
            .interact()
    }
}

/// A reply fed to [`ScriptedPrompter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    Select(usize),
    Input(String),
    Confirm(bool),
}

/// Answers questions from a fixed script, for non-interactive callers and tests.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    replies: VecDeque<Scripted>,
    /// Messages of every question asked, in order.
    pub asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new(replies: impl IntoIterator<Item = Scripted>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            asked: Vec::new(),
        }
    }

    fn next(&mut self, message: &str) -> Result<Scripted, dialoguer::Error> {
        self.asked.push(message.to_string());
        self.replies.pop_front().ok_or_else(|| {
            dialoguer::Error::IO(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no scripted reply for '{message}'"),
            ))
        })
    }
}

fn unexpected(reply: &Scripted, message: &str) -> dialoguer::Error {
    dialoguer::Error::IO(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("scripted reply {reply:?} does not fit '{message}'"),
    ))
}

impl Prompter for ScriptedPrompter {
    fn select(&mut self, message: &str, _items: &[String], _default: usize) -> Result<usize, dialoguer::Error> {
        match self.next(message)? {
            Scripted::Select(index) => Ok(index),
            other => Err(unexpected(&other, message)),
        }
    }

    fn input(&mut self, message: &str, default: Option<&str>) -> Result<String, dialoguer::Error> {
        match self.next(message)? {
            Scripted::Input(text) if text.is_empty() => Ok(default.unwrap_or_default().to_string()),
            Scripted::Input(text) => Ok(text),
            other => Err(unexpected(&other, message)),
        }
    }

    fn confirm(&mut self, message: &str) -> Result<bool, dialoguer::Error> {
        match self.next(message)? {
            Scripted::Confirm(yes) => Ok(yes),
            other => Err(unexpected(&other, message)),
        }
    }
}

/// Asks every visible question in order.
///
/// A declined confirmation stops immediately with [`OperationError::Cancelled`],
/// as does an interrupted prompt.
pub fn ask(prompter: &mut dyn Prompter, questions: Vec<Question>) -> Result<Answers, OperationError> {
    let mut answers = Answers::default();
    for question in questions {
        match question {
            Question::Select {
                name,
                message,
                choices,
                when,
            } => {
                if !when || choices.is_empty() {
                    continue;
                }
                let labels: Vec<String> = choices.iter().map(|c| c.label.clone()).collect();
                let index = prompter.select(&message, &labels, 0).map_err(prompt_error)?;
                if let Some(choice) = choices.get(index) {
                    answers.insert(name, Answer::Text(choice.value.clone()));
                }
            }
            Question::Input {
                name,
                message,
                default,
                when,
            } => {
                if !when {
                    continue;
                }
                let value = prompter
                    .input(&message, default.as_deref())
                    .map_err(prompt_error)?;
                answers.insert(name, Answer::Text(value.trim().to_string()));
            }
            Question::Confirm { name, message, when } => {
                if !when {
                    continue;
                }
                let text = message(&answers);
                let yes = prompter.confirm(&text).map_err(prompt_error)?;
                answers.insert(name, Answer::Confirm(yes));
                if !yes {
                    return Err(OperationError::Cancelled);
                }
            }
        }
    }
    Ok(answers)
}

fn prompt_error(error: dialoguer::Error) -> OperationError {
    let interrupted = matches!(&error, dialoguer::Error::IO(e) if e.kind() == io::ErrorKind::Interrupted);
    if interrupted {
        OperationError::Cancelled
    } else {
        OperationError::Prompt(error)
    }
}

/// Flags deciding which questions are shown.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub cli: &'a CliSettings,
    pub use_default: bool,
    pub disable_confirm: bool,
}

impl StepContext<'_> {
    fn asks(&self, given: Option<&String>) -> bool {
        !self.use_default && given.is_none()
    }

    fn confirms(&self) -> bool {
        !self.use_default && !self.disable_confirm
    }
}

pub fn generate_steps(ctx: StepContext<'_>, templates: Vec<Choice>, workspaces: Vec<String>) -> Vec<Question> {
    let name = ctx.cli.name.clone();
    let workspace = ctx.cli.workspace.clone();
    vec![
        Question::Select {
            name: "template",
            message: "Select a template".into(),
            choices: templates,
            when: ctx.asks(ctx.cli.template.as_ref()),
        },
        Question::Select {
            name: "workspace",
            message: "Select which workspace to use".into(),
            choices: workspaces.into_iter().map(Choice::plain).collect(),
            when: ctx.asks(ctx.cli.workspace.as_ref()),
        },
        Question::Input {
            name: "name",
            message: "Input the name of the app".into(),
            default: None,
            when: ctx.asks(ctx.cli.name.as_ref()),
        },
        Question::Confirm {
            name: "confirm",
            message: Box::new(move |a| {
                format!(
                    "Are you sure you want to create an app named {} in {}?",
                    a.text("name").or(name.as_deref()).unwrap_or_default(),
                    a.text("workspace").or(workspace.as_deref()).unwrap_or_default()
                )
            }),
            when: ctx.confirms(),
        },
    ]
}

pub fn delete_steps(ctx: StepContext<'_>, apps: Vec<Choice>) -> Vec<Question> {
    let name = ctx.cli.name.clone();
    vec![
        Question::Select {
            name: "app",
            message: "Select which app to delete".into(),
            choices: apps,
            when: ctx.asks(ctx.cli.name.as_ref()),
        },
        Question::Confirm {
            name: "confirm",
            message: Box::new(move |a| {
                format!(
                    "Are you sure you want to delete {}?",
                    a.text("app").or(name.as_deref()).unwrap_or_default()
                )
            }),
            when: ctx.confirms(),
        },
    ]
}

pub fn init_steps(ctx: StepContext<'_>, target: String, default_name: String) -> Vec<Question> {
    vec![
        Question::Input {
            name: "name",
            message: "Project name".into(),
            default: Some(default_name),
            when: ctx.asks(ctx.cli.name.as_ref()),
        },
        Question::Confirm {
            name: "confirm",
            message: Box::new(move |_| format!("Are you sure you want to initialize a new project in {target}?")),
            when: ctx.confirms(),
        },
    ]
}
