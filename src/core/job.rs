//! Task trait and related types

use std::fmt;

/// A unit of work dispatched to a task queue
///
/// Kernel task functions return nothing; a task reports its outcome through
/// the state it shares with its submitter.
pub trait Job: Send {
    /// Run the task. Called at most once per dispatch.
    fn execute(&mut self);

    /// Get the task's type name for debugging and statistics
    fn job_type(&self) -> &str {
        "Job"
    }
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({})", self.job_type())
    }
}

/// A boxed task that can be sent across threads
pub type BoxedJob = Box<dyn Job>;

/// Helper to create a task from a closure
///
/// The closure plays the role of the kernel's `func(arg)` pair: the
/// argument is whatever the closure captures.
pub struct ClosureJob<F>
where
    F: FnOnce() + Send,
{
    closure: Option<F>,
    name: String,
}

impl<F> ClosureJob<F>
where
    F: FnOnce() + Send,
{
    /// Create a new closure task
    pub fn new(closure: F) -> Self {
        Self {
            closure: Some(closure),
            name: "ClosureJob".to_string(),
        }
    }

    /// Create a new closure task with a custom name
    pub fn with_name<S: Into<String>>(closure: F, name: S) -> Self {
        Self {
            closure: Some(closure),
            name: name.into(),
        }
    }
}

impl<F> Job for ClosureJob<F>
where
    F: FnOnce() + Send,
{
    fn execute(&mut self) {
        match self.closure.take() {
            Some(closure) => closure(),
            None => log::warn!("{} executed twice, second run ignored", self.name),
        }
    }

    fn job_type(&self) -> &str {
        &self.name
    }
}
