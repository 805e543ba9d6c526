//! Task priorities and the per-queue ordering of pending tasks
//!
//! Priority is advisory: among pending tasks, a higher class drains first,
//! and within one class tasks leave in dispatch order. Nothing preempts a
//! running task.

use super::job::BoxedJob;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

/// Task priority levels (higher number = higher priority)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    /// Lowest priority - background tasks
    Low = 1,
    /// Normal priority - default for most tasks
    #[default]
    Normal = 5,
    /// High priority - important tasks
    High = 8,
    /// Critical priority - must be executed ASAP
    Critical = 10,
}

impl Priority {
    /// Get the numeric value of the priority
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

/// Opaque identifier of a dispatched task
///
/// Ids are handed out in dispatch order and are never zero, so the kernel
/// convention of "0 means not dispatched" still reads naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskqId(pub(crate) u64);

impl TaskqId {
    /// Raw numeric value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskqId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A task owned by a queue between dispatch and completion
pub struct WorkItem {
    pub(crate) priority: Priority,
    pub(crate) job: BoxedJob,
    pub(crate) id: TaskqId,
}

impl WorkItem {
    /// Create a new work item
    pub fn new(priority: Priority, job: BoxedJob, id: TaskqId) -> Self {
        Self { priority, job, id }
    }

    /// Get the priority of this item
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Get the dispatch id, which is also the FIFO sequence number
    pub fn id(&self) -> TaskqId {
        self.id
    }

    /// Name of the wrapped task
    pub fn job_type(&self) -> &str {
        self.job.job_type()
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("job", &self.job.job_type())
            .finish()
    }
}

/// Higher priority comes first; if equal, earlier id (FIFO)
impl PartialEq for WorkItem {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.id == other.id
    }
}

impl Eq for WorkItem {}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max-heap, so the earlier id must compare greater
            Ordering::Equal => other.id.cmp(&self.id),
            other => other,
        }
    }
}

/// Pending tasks of one task queue. Not synchronized; the queue's lock
/// guards it.
#[derive(Debug, Default)]
pub struct TaskQueue {
    heap: BinaryHeap<WorkItem>,
}

impl TaskQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Create a new queue with room for `capacity` items
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    /// Push an item onto the queue
    pub fn push(&mut self, item: WorkItem) {
        self.heap.push(item);
    }

    /// Pop the next item to run
    pub fn pop(&mut self) -> Option<WorkItem> {
        self.heap.pop()
    }

    /// Get the number of pending items
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClosureJob;

    fn item(priority: Priority, id: u64) -> WorkItem {
        WorkItem::new(priority, Box::new(ClosureJob::new(|| {})), TaskqId(id))
    }

    #[test]
    fn test_work_item_accessors() {
        let job = ClosureJob::with_name(|| {}, "txg_sync");
        let item = WorkItem::new(Priority::High, Box::new(job), TaskqId(1));

        assert_eq!(item.job_type(), "txg_sync");
        assert_eq!(item.priority(), Priority::High);
        assert_eq!(item.id(), TaskqId(1));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Priority::Critical.value(), 10);
    }

    #[test]
    fn test_queue_priority_order() {
        let mut queue = TaskQueue::new();
        queue.push(item(Priority::Low, 1));
        queue.push(item(Priority::High, 2));
        queue.push(item(Priority::Normal, 3));
        queue.push(item(Priority::Critical, 4));

        assert_eq!(queue.pop().unwrap().priority(), Priority::Critical);
        assert_eq!(queue.pop().unwrap().priority(), Priority::High);
        assert_eq!(queue.pop().unwrap().priority(), Priority::Normal);
        assert_eq!(queue.pop().unwrap().priority(), Priority::Low);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_queue_fifo_within_priority() {
        let mut queue = TaskQueue::with_capacity(3);
        queue.push(item(Priority::Normal, 7));
        queue.push(item(Priority::Normal, 8));
        queue.push(item(Priority::Normal, 9));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop().unwrap().id(), TaskqId(7));
        assert_eq!(queue.pop().unwrap().id(), TaskqId(8));
        assert_eq!(queue.pop().unwrap().id(), TaskqId(9));
        assert!(queue.is_empty());
    }
}
