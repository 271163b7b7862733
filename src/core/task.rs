//! # Task
//!
//! A `Task` is one node of a pipeline tree: it owns its children, holds a weak
//! back-reference to its parent and carries the live state the renderer reads
//! (message, status, progress, timing, error).
//!
//! Execution is single-threaded and cooperative. A node runs its own body once,
//! then its children strictly in declaration order. When a body fails the node
//! records the error, disables the work still pending at its level, marks every
//! ancestor as failed and hands the error to the nearest registered failure
//! handler, which may attach compensating children that run in the same pass.
//!
//! Bodies receive a [`TaskApi`] bound to their own node. They may append children
//! to that node while they run; the append happens synchronously before the body
//! resolves, which is only sound because nothing else schedules tasks meanwhile.

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use std::{
    cell::RefCell,
    fmt,
    future::Future,
    rc::{Rc, Weak},
    time::{Duration, Instant},
};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Future returned by task bodies and failure handlers.
pub type TaskFuture = LocalBoxFuture<'static, anyhow::Result<()>>;

/// The unit of work of a task. Invoked at most once.
pub type TaskBody = Box<dyn FnOnce(TaskApi) -> TaskFuture>;

/// Compensation hook bound to a task. Consumed when invoked.
pub type FailHandler = Box<dyn FnOnce(anyhow::Error, TaskApi) -> TaskFuture>;

/// Display state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Notification pushed to a bound renderer whenever a task changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// Some field of the task with this id changed, or a child was attached to it.
    Changed(Uuid),
    /// Every pipeline finished running.
    Finished,
}

/// Sender half used by tasks to notify a renderer.
pub type TaskNotifier = UnboundedSender<TaskEvent>;

/// Initial settings for a task. Children listed here are attached in order.
#[derive(Default)]
pub struct TaskSetting {
    pub message: Option<String>,
    pub description: Option<String>,
    pub status: Status,
    pub progress: Option<f64>,
    pub task: Option<TaskBody>,
    pub fail: Option<FailHandler>,
    pub children: Vec<TaskSetting>,
}

impl fmt::Debug for TaskSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSetting")
            .field("message", &self.message)
            .field("description", &self.description)
            .field("status", &self.status)
            .field("progress", &self.progress)
            .field("task", &self.task.is_some())
            .field("fail", &self.fail.is_some())
            .field("children", &self.children)
            .finish()
    }
}

struct TaskNode {
    id: Uuid,
    message: String,
    description: Option<String>,
    status: Status,
    progress: Option<f64>,
    execution: Option<Duration>,
    completed: bool,
    skipped: bool,
    error: Option<String>,
    level: usize,
    body: Option<TaskBody>,
    fail: Option<FailHandler>,
    parent: Weak<RefCell<TaskNode>>,
    children: Vec<Task>,
    notifier: Option<TaskNotifier>,
}

/// Shared handle to a node of a task tree.
///
/// Cloning the handle does not clone the node. Parents own their children
/// through these handles; the parent link is weak and only used to walk upwards.
#[derive(Clone)]
pub struct Task(Rc<RefCell<TaskNode>>);

/// Read-only copy of a task's observable state.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub id: Uuid,
    pub message: String,
    pub description: Option<String>,
    pub status: Status,
    pub progress: Option<f64>,
    pub execution: Option<Duration>,
    pub completed: bool,
    pub skipped: bool,
    pub error: Option<String>,
    pub level: usize,
}

impl Task {
    /// Builds a detached root task (level 0) with a fresh id.
    pub fn new(setting: TaskSetting) -> Self {
        let TaskSetting {
            message,
            description,
            status,
            progress,
            task,
            fail,
            children,
        } = setting;

        let node = TaskNode {
            id: Uuid::new_v4(),
            message: message.unwrap_or_default(),
            description,
            status,
            progress: progress.map(clamp_progress),
            execution: None,
            completed: false,
            skipped: false,
            error: None,
            level: 0,
            body: task,
            fail,
            parent: Weak::new(),
            children: Vec::new(),
            notifier: None,
        };

        let created = Self(Rc::new(RefCell::new(node)));
        for child in children {
            created.add(child);
        }
        created
    }

    pub fn id(&self) -> Uuid {
        self.0.borrow().id
    }

    pub fn message(&self) -> String {
        self.0.borrow().message.clone()
    }

    pub fn description(&self) -> Option<String> {
        self.0.borrow().description.clone()
    }

    pub fn status(&self) -> Status {
        self.0.borrow().status
    }

    pub fn progress(&self) -> Option<f64> {
        self.0.borrow().progress
    }

    /// Wall-clock time the body took, once it ran.
    pub fn execution(&self) -> Option<Duration> {
        self.0.borrow().execution
    }

    pub fn is_completed(&self) -> bool {
        self.0.borrow().completed
    }

    /// True when the body was dropped because earlier work at this level failed.
    pub fn is_skipped(&self) -> bool {
        self.0.borrow().skipped
    }

    pub fn error(&self) -> Option<String> {
        self.0.borrow().error.clone()
    }

    /// Depth in the tree, 0 for a root.
    pub fn level(&self) -> usize {
        self.0.borrow().level
    }

    pub fn parent(&self) -> Option<Self> {
        self.0.borrow().parent.upgrade().map(Self)
    }

    pub fn children(&self) -> Vec<Self> {
        self.0.borrow().children.clone()
    }

    pub fn has_fail_handler(&self) -> bool {
        self.0.borrow().fail.is_some()
    }

    /// Attaches `child` as the last child of this task and returns `self` for chaining.
    pub fn add(&self, child: impl Into<Self>) -> &Self {
        let child = child.into();
        let (level, notifier) = {
            let node = self.0.borrow();
            (node.level, node.notifier.clone())
        };

        child.0.borrow_mut().parent = Rc::downgrade(&self.0);
        child.relevel(level + 1);
        child.bind(notifier);
        self.0.borrow_mut().children.push(child);
        self.notify();
        self
    }

    /// Detaches the child with the same id, if present. The child becomes a root again.
    pub fn remove(&self, child: &Self) -> &Self {
        let child_id = child.id();
        let removed = {
            let mut node = self.0.borrow_mut();
            if node.children.is_empty() {
                return self;
            }
            let before = node.children.len();
            node.children.retain(|c| c.id() != child_id);
            before != node.children.len()
        };

        if removed {
            child.0.borrow_mut().parent = Weak::new();
            child.relevel(0);
            child.bind(None);
            self.notify();
        }
        self
    }

    /// Control surface bound to this node.
    pub fn api(&self) -> TaskApi {
        TaskApi { task: self.clone() }
    }

    /// Subscribes this task and all its descendants to `notifier` (or unsubscribes with `None`).
    pub fn bind(&self, notifier: Option<TaskNotifier>) {
        let children = {
            let mut node = self.0.borrow_mut();
            node.notifier = notifier.clone();
            node.children.clone()
        };
        for child in children {
            child.bind(notifier.clone());
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let node = self.0.borrow();
        TaskSnapshot {
            id: node.id,
            message: node.message.clone(),
            description: node.description.clone(),
            status: node.status,
            progress: node.progress,
            execution: node.execution,
            completed: node.completed,
            skipped: node.skipped,
            error: node.error.clone(),
            level: node.level,
        }
    }

    /// Snapshots of this task and every descendant, depth first, in display order.
    pub fn flatten(&self) -> Vec<TaskSnapshot> {
        let mut rows = vec![self.snapshot()];
        for child in self.children() {
            rows.extend(child.flatten());
        }
        rows
    }

    /// Runs the body (first call only), then every child in order.
    ///
    /// Never fails: errors raised by bodies or handlers end up in the
    /// `error`/`status` fields of the tree.
    pub fn run(&self) -> LocalBoxFuture<'static, ()> {
        let task = self.clone();
        async move { task.execute().await }.boxed_local()
    }

    async fn execute(&self) {
        let body = {
            let mut node = self.0.borrow_mut();
            if node.completed { None } else { node.body.take() }
        };

        if let Some(body) = body {
            log::trace!("Running task '{}'", self.message());
            let started = Instant::now();
            let outcome = body(self.api()).await;
            {
                let mut node = self.0.borrow_mut();
                node.execution = Some(started.elapsed());
                node.completed = true;
            }
            self.notify();

            if let Err(error) = outcome {
                self.recover(error).await;
            }
        }

        // Children may be appended while siblings run (failure handlers do this),
        // so the list is re-read on every step.
        let mut index = 0;
        loop {
            let child = self.0.borrow().children.get(index).cloned();
            let Some(child) = child else { break };
            child.run().await;
            index += 1;
        }
    }

    async fn recover(&self, error: anyhow::Error) {
        let message = format!("{error}");
        log::debug!("Task '{}' failed: {}", self.message(), message);
        {
            let mut node = self.0.borrow_mut();
            node.completed = true;
            node.error = Some(message);
        }

        if let Some(parent) = self.parent() {
            for sibling in parent.children() {
                sibling.disable();
            }
        }
        for child in self.children() {
            child.disable();
        }

        let mut handler = None;
        let mut cursor = Some(self.clone());
        while let Some(node) = cursor {
            node.set_status(Status::Error);
            if handler.is_none() {
                handler = node.take_fail().map(|h| (node.clone(), h));
            }
            cursor = node.parent();
        }

        if let Some((owner, handler)) = handler {
            if let Err(handler_error) = handler(error, owner.api()).await {
                log::warn!(
                    "Failure handler of task '{}' failed: {}",
                    owner.message(),
                    handler_error
                );
                owner.0.borrow_mut().error = Some(format!("{handler_error}"));
                owner.notify();
            }
        }
    }

    /// Drops the pending body of this task and of its whole subtree.
    fn disable(&self) {
        let children = {
            let mut node = self.0.borrow_mut();
            if !node.completed && node.body.is_some() {
                node.body = None;
                node.skipped = true;
            }
            node.children.clone()
        };
        for child in children {
            child.disable();
        }
        self.notify();
    }

    fn take_fail(&self) -> Option<FailHandler> {
        self.0.borrow_mut().fail.take()
    }

    fn relevel(&self, level: usize) {
        let children = {
            let mut node = self.0.borrow_mut();
            node.level = level;
            node.children.clone()
        };
        for child in children {
            child.relevel(level + 1);
        }
    }

    fn set_status(&self, status: Status) {
        self.0.borrow_mut().status = status;
        self.notify();
    }

    fn notify(&self) {
        let (id, notifier) = {
            let node = self.0.borrow();
            (node.id, node.notifier.clone())
        };
        if let Some(notifier) = notifier {
            // The renderer may already be gone; state stays readable either way.
            let _ = notifier.send(TaskEvent::Changed(id));
        }
    }
}

impl From<TaskSetting> for Task {
    fn from(setting: TaskSetting) -> Self {
        Self::new(setting)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.0.borrow();
        f.debug_struct("Task")
            .field("id", &node.id)
            .field("message", &node.message)
            .field("status", &node.status)
            .field("level", &node.level)
            .field("completed", &node.completed)
            .field("error", &node.error)
            .field("children", &node.children)
            .finish()
    }
}

/// Control surface handed to task bodies and failure handlers.
///
/// Every method acts on the node the surface was created for.
#[derive(Clone, Debug)]
pub struct TaskApi {
    task: Task,
}

impl TaskApi {
    /// The node this surface is bound to.
    pub fn node(&self) -> &Task {
        &self.task
    }

    pub fn add(&self, child: impl Into<Task>) {
        self.task.add(child);
    }

    /// Registers (or replaces) the failure handler of this node.
    pub fn set_fail<F, Fut>(&self, handler: F)
    where
        F: FnOnce(anyhow::Error, TaskApi) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let boxed: FailHandler = Box::new(move |error, api| handler(error, api).boxed_local());
        self.task.0.borrow_mut().fail = Some(boxed);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.task.0.borrow_mut().message = message.into();
        self.task.notify();
    }

    pub fn set_status(&self, status: Status) {
        self.task.set_status(status);
    }

    pub fn set_description(&self, description: impl Into<String>) {
        self.task.0.borrow_mut().description = Some(description.into());
        self.task.notify();
    }

    /// Sets progress, clamped to `0.0..=1.0`.
    pub fn set_progress(&self, progress: f64) {
        self.task.0.borrow_mut().progress = Some(clamp_progress(progress));
        self.task.notify();
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 1.0) }
}
