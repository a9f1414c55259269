//! Task control block and the fixed-capacity task table.

use crate::config::{MAX_TASKS, TaskHandler};
use crate::mpu::SrdPermissionMask;

/// Task lifecycle state. See spec §3.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TaskState {
    Invalid,
    Stopped,
    Ready,
    Delayed,
    BlockedMutex,
    BlockedSemaphore,
}

/// What a blocked/stopped task was blocked on, for `ps` reporting.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum BlockingResource {
    None,
    Mutex(u8),
    Semaphore(u8),
}

/// A task's name, stored inline (15 chars + NUL, matching the C original's
/// `char name[16]`).
#[derive(Copy, Clone)]
pub struct TaskName {
    bytes: [u8; 16],
}

impl TaskName {
    pub const fn empty() -> Self {
        TaskName { bytes: [0; 16] }
    }

    pub fn from_str(name: &str) -> Self {
        let mut bytes = [0u8; 16];
        for (dst, src) in bytes.iter_mut().zip(name.as_bytes()).take(15) {
            *dst = *src;
        }
        TaskName { bytes }
    }

    pub fn as_str(&self) -> &str {
        let len = self.bytes.iter().position(|&b| b == 0).unwrap_or(15);
        core::str::from_utf8(&self.bytes[..len]).unwrap_or("")
    }

    pub fn as_bytes16(&self) -> [u8; 16] {
        self.bytes
    }
}

impl PartialEq<&str> for TaskName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Task control block. One entry per task slot.
#[derive(Copy, Clone)]
pub struct Tcb {
    pub state: TaskState,
    /// Entry-point address, used as the task's stable identity (pid).
    pub pid: u32,
    /// Initial top of stack.
    pub sp_init: u32,
    /// Current stack pointer, 8-byte aligned.
    pub sp: u32,
    pub priority: u8,
    pub current_priority: u8,
    /// Remaining 1 ms units of sleep; valid only while `Delayed`.
    pub ticks: u32,
    /// Permission bitmap: sub-regions this task may access.
    pub srd: SrdPermissionMask,
    pub name: TaskName,
    pub mutex: u8,
    pub semaphore: u8,
    /// Cumulative CPU-time ticks consumed, monotonically increasing.
    pub runtime: u32,
    pub handler: Option<TaskHandler>,
}

impl Tcb {
    pub const fn invalid() -> Self {
        Tcb {
            state: TaskState::Invalid,
            pid: 0,
            sp_init: 0,
            sp: 0,
            priority: 0,
            current_priority: 0,
            ticks: 0,
            srd: SrdPermissionMask::none(),
            name: TaskName::empty(),
            mutex: 0,
            semaphore: 0,
            runtime: 0,
            handler: None,
        }
    }

    pub fn blocking_resource(&self) -> BlockingResource {
        match self.state {
            TaskState::BlockedMutex => BlockingResource::Mutex(self.mutex),
            TaskState::BlockedSemaphore => BlockingResource::Semaphore(self.semaphore),
            _ => BlockingResource::None,
        }
    }
}

/// Fixed-capacity table of task control blocks.
pub struct TaskTable {
    pub tasks: [Tcb; MAX_TASKS],
    pub count: usize,
}

impl TaskTable {
    pub const fn new() -> Self {
        TaskTable {
            tasks: [Tcb::invalid(); MAX_TASKS],
            count: 0,
        }
    }

    /// Index of the first `Invalid` slot, if any.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.tasks.iter().position(|t| t.state == TaskState::Invalid)
    }

    /// Whether `pid` already identifies a task in the table (any state).
    pub fn contains_pid(&self, pid: u32) -> bool {
        self.tasks
            .iter()
            .any(|t| t.state != TaskState::Invalid && t.pid == pid)
    }

    pub fn index_of_pid(&self, pid: u32) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.state != TaskState::Invalid && t.pid == pid)
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.tasks
            .iter()
            .position(|t| t.state != TaskState::Invalid && t.name == name)
    }

    pub fn total_runtime(&self) -> u64 {
        self.tasks.iter().map(|t| t.runtime as u64).sum()
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips() {
        let n = TaskName::from_str("ReadKeys");
        assert_eq!(n.as_str(), "ReadKeys");
    }

    #[test]
    fn name_truncates_long_names() {
        let n = TaskName::from_str("ThisNameIsWayTooLongForSixteenBytes");
        assert_eq!(n.as_str().len(), 15);
    }

    #[test]
    fn first_free_slot_finds_invalid() {
        let mut t = TaskTable::new();
        t.tasks[0].state = TaskState::Ready;
        t.tasks[1].state = TaskState::Ready;
        assert_eq!(t.first_free_slot(), Some(2));
    }

    #[test]
    fn contains_pid_ignores_invalid_slots() {
        let mut t = TaskTable::new();
        t.tasks[0].pid = 0x1234;
        t.tasks[0].state = TaskState::Invalid;
        assert!(!t.contains_pid(0x1234));
        t.tasks[0].state = TaskState::Ready;
        assert!(t.contains_pid(0x1234));
    }
}
