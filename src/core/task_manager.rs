// src/core/task_manager.rs

//! Runs task pipelines while keeping a tree view of them on screen.
//!
//! Tasks push [`TaskEvent`]s into a channel; the display loop coalesces them and
//! redraws at most once per tick. Pipelines run one after the other.

use super::task::{Status, Task, TaskEvent, TaskSnapshot};
use colored::Colorize;
use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use std::io::{self, IsTerminal, Write};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const DEFAULT_TICK: Duration = Duration::from_millis(80);

/// How the task tree is shown while pipelines run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// `Live` on an interactive terminal, `Plain` otherwise.
    #[default]
    Auto,
    /// Redraw the tree in place on every change.
    Live,
    /// Print the final tree once.
    Plain,
    /// Render nothing.
    Hidden,
}

impl DisplayMode {
    fn resolve(self) -> Self {
        match self {
            Self::Auto if io::stdout().is_terminal() => Self::Live,
            Self::Auto => Self::Plain,
            other => other,
        }
    }
}

/// Final state of every rendered task, in display order.
#[derive(Debug, Clone, Default)]
pub struct RenderSummary {
    rows: Vec<TaskSnapshot>,
}

impl RenderSummary {
    pub fn rows(&self) -> &[TaskSnapshot] {
        &self.rows
    }

    /// True if any task ended in error.
    pub fn failed(&self) -> bool {
        self.rows
            .iter()
            .any(|row| row.status == Status::Error || row.error.is_some())
    }

    /// First recorded error message, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.rows.iter().find_map(|row| row.error.as_deref())
    }

    pub fn find(&self, message: &str) -> Option<&TaskSnapshot> {
        self.rows.iter().find(|row| row.message == message)
    }
}

#[derive(Debug, Clone)]
pub struct TaskManager {
    mode: DisplayMode,
    tick: Duration,
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(DisplayMode::Auto)
    }
}

impl TaskManager {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            mode,
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Runs every pipeline in order and renders their trees until all are done.
    ///
    /// Never fails: task errors are part of the returned summary.
    pub async fn render(&self, tasks: Vec<Task>) -> RenderSummary {
        let (tx, rx) = mpsc::unbounded_channel();
        for task in &tasks {
            task.bind(Some(tx.clone()));
        }

        let runner = async {
            for task in &tasks {
                task.run().await;
            }
            let _ = tx.send(TaskEvent::Finished);
        };
        let display = self.display(&tasks, rx);
        tokio::join!(runner, display);

        for task in &tasks {
            task.bind(None);
        }

        let summary = RenderSummary {
            rows: tasks.iter().flat_map(Task::flatten).collect(),
        };
        log::debug!(
            "Rendered {} task(s), failed: {}",
            summary.rows.len(),
            summary.failed()
        );
        summary
    }

    async fn display(&self, tasks: &[Task], mut rx: UnboundedReceiver<TaskEvent>) {
        let mode = self.mode.resolve();
        let mut frame = 0usize;
        let mut drawn = 0usize;
        let mut dirty = true;
        let mut interval = tokio::time::interval(self.tick);

        let mut stdout = io::stdout();
        let live = mode == DisplayMode::Live;
        if live {
            let _ = execute!(stdout, cursor::Hide);
        }
        let _cursor = scopeguard::guard(live, |live| {
            if live {
                let _ = execute!(io::stdout(), cursor::Show);
            }
        });

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(TaskEvent::Changed(_)) => dirty = true,
                    Some(TaskEvent::Finished) | None => break,
                },
                _ = interval.tick() => {
                    frame = frame.wrapping_add(1);
                    let spinning = tasks
                        .iter()
                        .flat_map(Task::flatten)
                        .any(|row| row.status == Status::Loading);
                    if live && (dirty || spinning) {
                        drawn = redraw(&mut stdout, tasks, frame, drawn);
                        dirty = false;
                    }
                }
            }
        }

        match mode {
            DisplayMode::Live => {
                redraw(&mut stdout, tasks, frame, drawn);
            }
            DisplayMode::Plain => {
                redraw(&mut stdout, tasks, frame, 0);
            }
            DisplayMode::Hidden | DisplayMode::Auto => {}
        }
    }
}

fn redraw(out: &mut impl Write, tasks: &[Task], frame: usize, previous: usize) -> usize {
    let lines: Vec<String> = tasks
        .iter()
        .flat_map(Task::flatten)
        .flat_map(|row| format_row(&row, frame))
        .collect();

    if previous > 0 {
        let up = u16::try_from(previous).unwrap_or(u16::MAX);
        if let Err(e) = execute!(out, cursor::MoveUp(up), cursor::MoveToColumn(0)) {
            log::debug!("Could not move the cursor: {}", e);
        }
    }
    let _ = execute!(out, Clear(ClearType::FromCursorDown));
    for line in &lines {
        let _ = writeln!(out, "{}", line);
    }
    let _ = out.flush();
    lines.len()
}

/// Turns one task into its display lines: the task row, plus a description row if present.
pub fn format_row(row: &TaskSnapshot, frame: usize) -> Vec<String> {
    let indent = " ".repeat(row.level * 2);
    let glyph = match row.status {
        Status::Success => "✔".green().to_string(),
        Status::Error => "✖".red().to_string(),
        Status::Idle => "ℹ".blue().to_string(),
        Status::Loading => SPINNER_FRAMES
            .get(frame % SPINNER_FRAMES.len())
            .copied()
            .unwrap_or("⠋")
            .yellow()
            .to_string(),
    };

    let body = match &row.error {
        Some(error) => format!(
            "{} {} {}",
            " Error ".on_red().white().bold(),
            error,
            format!("({})", row.message).bright_black()
        ),
        None => {
            let mut text = row.message.clone();
            match (row.progress, row.execution) {
                (_, Some(took)) => {
                    let took = format!("took {:.3}s", took.as_secs_f64());
                    text.push_str(&format!(" {}", took.bright_black()));
                }
                (Some(progress), None) => {
                    text.push_str(&format!(" {}", percent(progress)));
                }
                (None, None) => {}
            }
            text
        }
    };

    let mut lines = vec![format!("{indent}{glyph} {body}")];
    if let Some(description) = &row.description {
        lines.push(format!("{indent}  {}", description.bright_black()));
    }
    lines
}

fn percent(progress: f64) -> String {
    let value = (progress.clamp(0.0, 1.0) * 100.0).round();
    format!("{value:.0}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task_builder::task;
    use anyhow::anyhow;
    use uuid::Uuid;

    fn snapshot(message: &str) -> TaskSnapshot {
        TaskSnapshot {
            id: Uuid::new_v4(),
            message: message.to_string(),
            description: None,
            status: Status::Idle,
            progress: None,
            execution: None,
            completed: false,
            skipped: false,
            error: None,
            level: 0,
        }
    }

    #[test]
    fn rows_are_indented_by_level() {
        colored::control::set_override(false);
        let mut row = snapshot("Copying");
        row.level = 2;
        row.status = Status::Success;
        row.execution = Some(Duration::from_millis(1250));

        let lines = format_row(&row, 0);
        assert_eq!(lines, vec!["    ✔ Copying took 1.250s"]);
    }

    #[test]
    fn progress_is_shown_until_the_task_completes() {
        colored::control::set_override(false);
        let mut row = snapshot("Copying: a.txt");
        row.status = Status::Loading;
        row.progress = Some(0.426);
        row.description = Some("3 of 7".into());

        let lines = format_row(&row, 0);
        assert_eq!(lines, vec!["⠋ Copying: a.txt 43%", "  3 of 7"]);
    }

    #[test]
    fn errors_replace_the_message() {
        colored::control::set_override(false);
        let mut row = snapshot("Copying");
        row.status = Status::Error;
        row.error = Some("disk full".into());

        let lines = format_row(&row, 0);
        assert_eq!(lines, vec!["✖  Error  disk full (Copying)"]);
    }

    #[tokio::test]
    async fn render_runs_every_pipeline_in_order() {
        let first = task("first", |api| async move {
            api.task("nested", |_| async { Ok(()) });
            Ok(())
        });
        let second = task("second", |_| async { Err(anyhow!("broken")) });

        let summary = TaskManager::new(DisplayMode::Hidden)
            .render(vec![first, second])
            .await;

        let messages: Vec<_> = summary.rows().iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "nested", "second"]);
        assert!(summary.failed());
        assert_eq!(summary.first_error(), Some("broken"));
    }

    #[tokio::test]
    async fn render_of_nothing_is_an_empty_success() {
        let summary = TaskManager::new(DisplayMode::Hidden).render(vec![]).await;
        assert!(summary.rows().is_empty());
        assert!(!summary.failed());
    }
}
