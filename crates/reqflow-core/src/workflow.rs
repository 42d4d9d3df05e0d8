//! Workflow flags: importing, analyzing and dirty.
//!
//! The flags are independent booleans with edge-triggered notification:
//! only an actual change publishes `WorkflowStateChanged`. Long-running
//! operations claim their flag through [`WorkflowState::begin`], which
//! rejects a second operation of the same kind and clears the flag when the
//! returned guard is dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::bus::EventBus;
use crate::error::{ReqflowError, ReqflowResult};
use crate::events::DomainEvent;

/// One of the three workflow flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowFlag {
    Importing,
    Analyzing,
    Dirty,
}

impl WorkflowFlag {
    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Importing => "importing",
            Self::Analyzing => "analyzing",
            Self::Dirty => "dirty",
        }
    }
}

impl fmt::Display for WorkflowFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of all flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub importing: bool,
    pub analyzing: bool,
    pub dirty: bool,
}

impl WorkflowSnapshot {
    fn slot(&mut self, flag: WorkflowFlag) -> &mut bool {
        match flag {
            WorkflowFlag::Importing => &mut self.importing,
            WorkflowFlag::Analyzing => &mut self.analyzing,
            WorkflowFlag::Dirty => &mut self.dirty,
        }
    }

    pub fn get(&self, flag: WorkflowFlag) -> bool {
        match flag {
            WorkflowFlag::Importing => self.importing,
            WorkflowFlag::Analyzing => self.analyzing,
            WorkflowFlag::Dirty => self.dirty,
        }
    }
}

/// Observable workflow flags.
pub struct WorkflowState {
    flags: Mutex<WorkflowSnapshot>,
    bus: Arc<EventBus>,
}

impl WorkflowState {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            flags: Mutex::new(WorkflowSnapshot::default()),
            bus,
        }
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        *self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, flag: WorkflowFlag) -> bool {
        self.snapshot().get(flag)
    }

    pub fn is_importing(&self) -> bool {
        self.get(WorkflowFlag::Importing)
    }

    pub fn is_analyzing(&self) -> bool {
        self.get(WorkflowFlag::Analyzing)
    }

    pub fn is_dirty(&self) -> bool {
        self.get(WorkflowFlag::Dirty)
    }

    /// Set a flag. Returns true and publishes one event if the value changed.
    pub fn set(&self, flag: WorkflowFlag, value: bool) -> bool {
        let old = {
            let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = flags.slot(flag);
            let old = *slot;
            if old == value {
                return false;
            }
            *slot = value;
            old
        };

        debug!(flag = %flag, old, new = value, "Workflow flag changed");
        self.bus.publish(DomainEvent::WorkflowStateChanged { flag, old, new: value });
        true
    }

    pub fn mark_dirty(&self) -> bool {
        self.set(WorkflowFlag::Dirty, true)
    }

    pub fn mark_clean(&self) -> bool {
        self.set(WorkflowFlag::Dirty, false)
    }

    /// Claim `flag` for the duration of an operation.
    ///
    /// Fails with [`ReqflowError::Busy`] if an operation of the same kind is
    /// already running. The flag is cleared when the guard drops, including
    /// on cancellation.
    pub fn begin(self: &Arc<Self>, flag: WorkflowFlag) -> ReqflowResult<OperationGuard> {
        if flag == WorkflowFlag::Dirty {
            return Err(ReqflowError::validation("the dirty flag cannot be claimed by an operation"));
        }

        {
            let mut flags = self.flags.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = flags.slot(flag);
            if *slot {
                return Err(ReqflowError::Busy(flag));
            }
            *slot = true;
        }

        debug!(flag = %flag, "Operation started");
        self.bus.publish(DomainEvent::WorkflowStateChanged { flag, old: false, new: true });
        Ok(OperationGuard {
            state: Arc::clone(self),
            flag,
        })
    }
}

/// Clears its workflow flag on drop.
pub struct OperationGuard {
    state: Arc<WorkflowState>,
    flag: WorkflowFlag,
}

impl OperationGuard {
    pub fn flag(&self) -> WorkflowFlag {
        self.flag
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.state.set(self.flag, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    fn setup() -> (Arc<WorkflowState>, Arc<Mutex<Vec<(WorkflowFlag, bool, bool)>>>) {
        let bus = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(EventKind::WorkflowStateChanged, move |event: &DomainEvent| -> anyhow::Result<()> {
            if let DomainEvent::WorkflowStateChanged { flag, old, new } = event {
                sink.lock().unwrap().push((*flag, *old, *new));
            }
            Ok(())
        });
        (Arc::new(WorkflowState::new(bus)), seen)
    }

    #[test]
    fn test_setting_same_value_publishes_nothing() {
        let (state, seen) = setup();
        assert!(!state.set(WorkflowFlag::Dirty, false));
        assert!(!state.set(WorkflowFlag::Importing, false));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_change_publishes_exactly_one_event() {
        let (state, seen) = setup();
        assert!(state.mark_dirty());
        assert!(!state.mark_dirty());
        assert!(state.mark_clean());

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(WorkflowFlag::Dirty, false, true), (WorkflowFlag::Dirty, true, false)]
        );
    }

    #[test]
    fn test_flags_are_independent() {
        let (state, _seen) = setup();
        state.set(WorkflowFlag::Analyzing, true);
        state.mark_dirty();
        assert_eq!(
            state.snapshot(),
            WorkflowSnapshot {
                importing: false,
                analyzing: true,
                dirty: true
            }
        );
    }

    #[test]
    fn test_guard_rejects_concurrent_operation_and_clears_on_drop() {
        let (state, seen) = setup();
        let guard = state.begin(WorkflowFlag::Importing).unwrap();
        assert!(state.is_importing());
        assert!(matches!(
            state.begin(WorkflowFlag::Importing),
            Err(ReqflowError::Busy(WorkflowFlag::Importing))
        ));
        // a different kind is not blocked
        let analyzing = state.begin(WorkflowFlag::Analyzing).unwrap();
        drop(analyzing);

        drop(guard);
        assert!(!state.is_importing());
        assert_eq!(seen.lock().unwrap().len(), 4);
        assert!(state.begin(WorkflowFlag::Importing).is_ok());
    }

    #[test]
    fn test_dirty_cannot_be_claimed() {
        let (state, _seen) = setup();
        assert!(state.begin(WorkflowFlag::Dirty).is_err());
    }
}
