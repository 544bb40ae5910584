use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub u64);

#[derive(Debug)]
struct ScheduledTask<T> {
    wake_at: f64,
    handle: TaskHandle,
    task: T,
}

impl<T> PartialEq for ScheduledTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for ScheduledTask<T> {}

impl<T> PartialOrd for ScheduledTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ScheduledTask<T> {
    // Reversed so the max-heap pops the earliest wake time; ties go to the oldest handle.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .wake_at
            .total_cmp(&self.wake_at)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}

/// Wake-time ordered queue of delayed work, polled once per tick.
#[derive(Debug)]
pub struct TaskScheduler<T> {
    queue: BinaryHeap<ScheduledTask<T>>,
    cancelled: HashSet<TaskHandle>,
    next_handle: u64,
}

impl<T> Default for TaskScheduler<T> {
    fn default() -> Self {
        Self {
            queue: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_handle: 0,
        }
    }
}

impl<T> TaskScheduler<T> {
    pub fn schedule(&mut self, wake_at: f64, task: T) -> TaskHandle {
        let handle = TaskHandle(self.next_handle);
        self.next_handle = self.next_handle.saturating_add(1);
        self.queue.push(ScheduledTask {
            wake_at,
            handle,
            task,
        });
        handle
    }

    /// Returns false when the task already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> bool {
        let queued = self.queue.iter().any(|scheduled| scheduled.handle == handle);
        queued && self.cancelled.insert(handle)
    }

    pub fn len(&self) -> usize {
        self.queue.len().saturating_sub(self.cancelled.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns every live task with `wake_at <= now`, earliest first.
    pub fn drain_due(&mut self, now: f64) -> Vec<(TaskHandle, T)> {
        let mut due = Vec::new();
        while self
            .queue
            .peek()
            .is_some_and(|scheduled| scheduled.wake_at <= now)
        {
            let Some(scheduled) = self.queue.pop() else {
                break;
            };
            if self.cancelled.remove(&scheduled.handle) {
                continue;
            }
            due.push((scheduled.handle, scheduled.task));
        }
        due
    }
}
