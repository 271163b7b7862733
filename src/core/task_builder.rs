// src/core/task_builder.rs

//! Shorthand constructors used by the operation pipelines.

use super::task::{FailHandler, Status, Task, TaskApi, TaskBody, TaskSetting};
use futures::FutureExt;
use std::future::Future;

/// A root-level task with a message and a body.
pub fn task<F, Fut>(message: impl Into<String>, body: F) -> Task
where
    F: FnOnce(TaskApi) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    task_with(message, Status::Idle, body)
}

/// Like [`task`], starting from the given display status.
pub fn task_with<F, Fut>(message: impl Into<String>, status: Status, body: F) -> Task
where
    F: FnOnce(TaskApi) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    Task::new(TaskSetting {
        message: Some(message.into()),
        status,
        task: Some(boxed_body(body)),
        ..Default::default()
    })
}

pub(crate) fn boxed_body<F, Fut>(body: F) -> TaskBody
where
    F: FnOnce(TaskApi) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    Box::new(move |api| body(api).boxed_local())
}

impl TaskApi {
    /// Appends a child task to this node and returns it.
    pub fn task<F, Fut>(&self, message: impl Into<String>, body: F) -> Task
    where
        F: FnOnce(TaskApi) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let child = task(message, body);
        self.add(child.clone());
        child
    }

    /// Appends a child task that starts in the given status.
    pub fn task_with<F, Fut>(&self, message: impl Into<String>, status: Status, body: F) -> Task
    where
        F: FnOnce(TaskApi) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let child = task_with(message, status, body);
        self.add(child.clone());
        child
    }

    /// Registers a failure handler that first flags this node as failed.
    ///
    /// The handler receives the control surface of this node, so children it
    /// adds (typically a rollback) run right after the failing subtree.
    pub fn task_fail<F, Fut>(&self, handler: F)
    where
        F: FnOnce(TaskApi, anyhow::Error) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        self.set_fail(move |error, api: TaskApi| {
            api.set_status(Status::Error);
            handler(api, error)
        });
    }
}

/// Wraps a handler so it can be stored directly in a [`TaskSetting`].
pub fn fail_handler<F, Fut>(handler: F) -> FailHandler
where
    F: FnOnce(anyhow::Error, TaskApi) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    Box::new(move |error, api| handler(error, api).boxed_local())
}
