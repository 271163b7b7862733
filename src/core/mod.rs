// src/core/mod.rs

pub mod batch;
pub mod package;
pub mod paths;
pub mod project;
pub mod task;
pub mod task_builder;
pub mod task_manager;
pub mod traversal;
