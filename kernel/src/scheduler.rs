//! Task selection: priority-with-round-robin-among-ties, or plain
//! round-robin, chosen at runtime.
//!
//! Grounded in `rtosScheduler()`: priority mode scans for the lowest
//! `current_priority` among ready tasks, then round-robins among the tasks
//! tied at that priority using a remembered cursor; round-robin mode just
//! advances a cursor to the next ready task. Unlike the teacher's
//! `update_to_next_task()`, which special-cases index 0 as a permanent
//! idle slot, task selection here is entirely state-driven: it only looks
//! at `TaskState` and priority, never a slot index.

use crate::task::{TaskState, TaskTable};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SchedulingPolicy {
    Priority,
    RoundRobin,
}

/// Scheduler cursor state, carried across calls so round-robin ordering is
/// deterministic and fair rather than restarting from slot 0 every tick.
pub struct Scheduler {
    pub policy: SchedulingPolicy,
    last_index: usize,
}

impl Scheduler {
    pub const fn new() -> Self {
        Scheduler { policy: SchedulingPolicy::Priority, last_index: 0 }
    }

    fn is_ready(task: &crate::task::Tcb) -> bool {
        task.state == TaskState::Ready
    }

    /// Picks the next task to run. Returns `None` only if no task in the
    /// table is `Ready` (the idle task should always be ready, so this is
    /// a genuine "nothing runnable" condition rather than routine).
    pub fn next_task(&mut self, table: &TaskTable) -> Option<usize> {
        match self.policy {
            SchedulingPolicy::RoundRobin => self.next_round_robin(table),
            SchedulingPolicy::Priority => self.next_priority(table),
        }
    }

    fn next_round_robin(&mut self, table: &TaskTable) -> Option<usize> {
        let n = table.tasks.len();
        for step in 1..=n {
            let idx = (self.last_index + step) % n;
            if Self::is_ready(&table.tasks[idx]) {
                self.last_index = idx;
                return Some(idx);
            }
        }
        None
    }

    fn is_candidate(table: &TaskTable, idx: usize, lowest: u8) -> bool {
        let task = &table.tasks[idx];
        Self::is_ready(task) && task.current_priority == lowest
    }

    /// Per spec §4.1: collect the ready tasks at the lowest `current_priority`
    /// in table order. If the previously dispatched task is itself one of
    /// them, return the candidate immediately after it, circularly. Otherwise
    /// — the previous task dropped out of the tied set, was never in it, or
    /// this is the first call — return the first candidate in table order,
    /// not whichever candidate happens to follow `last_index`.
    fn next_priority(&mut self, table: &TaskTable) -> Option<usize> {
        let lowest = table
            .tasks
            .iter()
            .filter(|t| Self::is_ready(t))
            .map(|t| t.current_priority)
            .min()?;

        let n = table.tasks.len();

        if Self::is_candidate(table, self.last_index, lowest) {
            for step in 1..=n {
                let idx = (self.last_index + step) % n;
                if Self::is_candidate(table, idx, lowest) {
                    self.last_index = idx;
                    return Some(idx);
                }
            }
            return None;
        }

        let idx = (0..n).find(|&idx| Self::is_candidate(table, idx, lowest))?;
        self.last_index = idx;
        Some(idx)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Tcb;

    fn ready(priority: u8) -> Tcb {
        let mut t = Tcb::invalid();
        t.state = TaskState::Ready;
        t.priority = priority;
        t.current_priority = priority;
        t
    }

    #[test]
    fn round_robin_cycles_through_ready_tasks() {
        let mut table = TaskTable::new();
        table.tasks[0] = ready(5);
        table.tasks[1] = ready(5);
        table.tasks[2] = ready(5);
        let mut sched = Scheduler { policy: SchedulingPolicy::RoundRobin, last_index: 0 };
        let first = sched.next_task(&table).unwrap();
        let second = sched.next_task(&table).unwrap();
        let third = sched.next_task(&table).unwrap();
        assert_ne!(first, second);
        assert_ne!(second, third);
    }

    #[test]
    fn priority_mode_prefers_lowest_priority_number() {
        let mut table = TaskTable::new();
        table.tasks[0] = ready(10);
        table.tasks[1] = ready(2);
        table.tasks[2] = ready(10);
        let mut sched = Scheduler::new();
        assert_eq!(sched.next_task(&table), Some(1));
    }

    #[test]
    fn priority_mode_round_robins_among_ties() {
        let mut table = TaskTable::new();
        table.tasks[0] = ready(3);
        table.tasks[1] = ready(3);
        let mut sched = Scheduler::new();
        let first = sched.next_task(&table).unwrap();
        let second = sched.next_task(&table).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn no_ready_task_returns_none() {
        let table = TaskTable::new();
        let mut sched = Scheduler::new();
        assert_eq!(sched.next_task(&table), None);
    }

    #[test]
    fn blocked_tasks_are_skipped() {
        let mut table = TaskTable::new();
        table.tasks[0] = ready(1);
        table.tasks[0].state = TaskState::BlockedMutex;
        table.tasks[1] = ready(5);
        let mut sched = Scheduler::new();
        assert_eq!(sched.next_task(&table), Some(1));
    }
}
