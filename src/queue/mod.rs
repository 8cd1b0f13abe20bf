//! Task queue module - task model, lifecycle events, and the scheduler

pub mod events;
pub mod scheduler;
pub mod task;

pub use events::{QueueEvent, QueueSnapshot};
pub use scheduler::{QueueConfig, TaskQueue};
pub use task::{Task, TaskStatus};
