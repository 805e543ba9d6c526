//! Error types for the kernel context
//!
//! Only expected, retryable outcomes travel through [`ThreadError`].
//! Programmer misuse (double init, unlock by a non-owner, destroying a held
//! lock, ...) never becomes a `ThreadError`; it goes through
//! [`crate::debug::misuse`] and takes the fatal path instead.

/// Result type for kernel context operations
pub type Result<T> = std::result::Result<T, ThreadError>;

/// Why a fail-fast dispatch refused to enqueue a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// `NOSLEEP` dispatch while the outstanding-task limit was reached
    AllocLimit {
        /// Tasks currently queued or running
        outstanding: usize,
        /// Configured `max_alloc`
        max: usize,
    },
    /// `NOQUEUE` dispatch while every worker was busy and none could be spawned
    NoIdleWorker {
        /// Workers currently executing a task
        active: usize,
        /// Live workers
        nthreads: usize,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::AllocLimit { outstanding, max } => {
                write!(f, "{}/{} tasks outstanding", outstanding, max)
            }
            RejectReason::NoIdleWorker { active, nthreads } => {
                write!(f, "{}/{} workers busy", active, nthreads)
            }
        }
    }
}

/// Errors that can occur in the kernel context
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ThreadError {
    /// Task queue is being destroyed or already destroyed
    #[error("Task queue '{pool_name}' is shutting down ({pending_tasks} tasks pending)")]
    ShuttingDown {
        /// Name of the task queue
        pool_name: String,
        /// Number of tasks still outstanding
        pending_tasks: usize,
    },

    /// Fail-fast dispatch refused to enqueue
    #[error("Dispatch to task queue '{pool_name}' rejected: {reason}")]
    DispatchRejected {
        /// Name of the task queue
        pool_name: String,
        /// Why the task was not enqueued
        reason: RejectReason,
    },

    /// Failed to spawn a worker thread with details
    #[error("Failed to spawn thread #{thread_id}: {message}")]
    SpawnError {
        /// Kernel thread id that would have been assigned
        thread_id: u64,
        /// Error message
        message: String,
        /// Source IO error
        #[source]
        source: Option<std::io::Error>,
    },

    /// Failed to join a thread
    #[error("Failed to join thread #{thread_id}: {message}")]
    JoinError {
        /// Kernel thread id of the thread
        thread_id: u64,
        /// Error message
        message: String,
    },

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },
}

impl ThreadError {
    /// Create a shutting down error
    pub fn shutting_down(pool_name: impl Into<String>, pending_tasks: usize) -> Self {
        ThreadError::ShuttingDown {
            pool_name: pool_name.into(),
            pending_tasks,
        }
    }

    /// Create a dispatch rejection
    pub fn rejected(pool_name: impl Into<String>, reason: RejectReason) -> Self {
        ThreadError::DispatchRejected {
            pool_name: pool_name.into(),
            reason,
        }
    }

    /// Create a spawn error with source
    pub fn spawn_with_source(
        thread_id: u64,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        ThreadError::SpawnError {
            thread_id,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a join error
    pub fn join(thread_id: u64, message: impl Into<String>) -> Self {
        ThreadError::JoinError {
            thread_id,
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        ThreadError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// True for the fail-fast rejections a caller may simply retry
    pub fn is_rejection(&self) -> bool {
        matches!(self, ThreadError::DispatchRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ThreadError::shutting_down("spa_zio", 3);
        assert!(matches!(err, ThreadError::ShuttingDown { .. }));

        let err = ThreadError::rejected(
            "spa_zio",
            RejectReason::AllocLimit {
                outstanding: 4,
                max: 4,
            },
        );
        assert!(err.is_rejection());

        let err = ThreadError::invalid_config("max_threads", "must be >= min_threads");
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_error_display() {
        let err = ThreadError::rejected(
            "dbuf_evict",
            RejectReason::NoIdleWorker {
                active: 2,
                nthreads: 2,
            },
        );
        assert_eq!(
            err.to_string(),
            "Dispatch to task queue 'dbuf_evict' rejected: 2/2 workers busy"
        );

        let err = ThreadError::shutting_down("txg_sync", 0);
        assert_eq!(
            err.to_string(),
            "Task queue 'txg_sync' is shutting down (0 tasks pending)"
        );
    }

    #[test]
    fn test_spawn_error_with_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "no stack");
        let err = ThreadError::spawn_with_source(5, "Cannot create thread", io_err);

        assert!(matches!(err, ThreadError::SpawnError { .. }));
        assert!(err.to_string().contains("thread #5"));
    }
}
