//! Canonical ordered set of requirement records.
//!
//! All mutations funnel through [`CollectionManager`]. Each mutation updates
//! the records under a single lock, releases it, then publishes exactly one
//! `CollectionChanged` (or `FieldUpdated`) event followed by a
//! `SelectionChanged` when the current record moved, and finally marks the
//! workflow dirty.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::error::{ReqflowError, ReqflowResult};
use crate::events::{CollectionAction, DomainEvent, Initiator};
use crate::requirement::model::{Analysis, Requirement};
use crate::requirement::{is_equivalent, same_sequence, AnalysisSelection};
use crate::workflow::WorkflowState;

/// Identity of one slot in the collection, independent of its identifier.
///
/// Identifiers may repeat, so work that started from a snapshot uses the key
/// to find its record again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordKey(u64);

#[derive(Debug, Default)]
struct CollectionState {
    records: Vec<Requirement>,
    /// Parallel to `records`.
    keys: Vec<RecordKey>,
    next_key: u64,
    /// Identity of the current record, resolved on every access.
    current: Option<String>,
}

impl CollectionState {
    fn position(&self, global_id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.global_id == global_id)
    }

    fn position_of_key(&self, key: RecordKey) -> Option<usize> {
        self.keys.iter().position(|k| *k == key)
    }

    fn current_record(&self) -> Option<Requirement> {
        let id = self.current.as_deref()?;
        self.position(id).map(|i| self.records[i].clone())
    }

    fn select_first(&mut self) {
        self.current = self.records.first().map(|r| r.global_id.clone());
    }

    fn push(&mut self, record: Requirement) {
        self.next_key += 1;
        self.keys.push(RecordKey(self.next_key));
        self.records.push(record);
    }

    fn remove_at(&mut self, index: usize) -> Requirement {
        self.keys.remove(index);
        self.records.remove(index)
    }

    fn reset(&mut self, records: Vec<Requirement>) -> Vec<Requirement> {
        self.keys.clear();
        let previous = std::mem::take(&mut self.records);
        for record in records {
            self.push(record);
        }
        previous
    }
}

fn has_identifier(requirement: &Requirement) -> bool {
    !requirement.global_id.trim().is_empty()
}

/// Result of reloading the collection from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The incoming set differed and replaced the collection.
    Replaced { count: usize },
    /// The incoming set was equivalent; the collection was kept.
    Unchanged { count: usize },
}

/// Result of an additive merge.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub added: Vec<Requirement>,
    pub skipped: usize,
}

/// A partial edit of a record's display fields.
///
/// Metadata entries set to `None` are removed.
#[derive(Debug, Clone, Default)]
pub struct FieldUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, Option<String>>,
}

impl FieldUpdate {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn set_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), Some(value.into()));
        self
    }

    pub fn remove_metadata(mut self, key: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), None);
        self
    }

    /// Apply to `record`, returning the names of fields that actually changed.
    fn apply(self, record: &mut Requirement) -> Vec<String> {
        let mut changed = Vec::new();
        if let Some(name) = self.name {
            if record.name != name {
                record.name = name;
                changed.push("name".to_string());
            }
        }
        if let Some(description) = self.description {
            if record.description != description {
                record.description = description;
                changed.push("description".to_string());
            }
        }
        for (key, value) in self.metadata {
            let differs = match &value {
                Some(v) => record.metadata.get(&key) != Some(v),
                None => record.metadata.contains_key(&key),
            };
            if !differs {
                continue;
            }
            match value {
                Some(v) => record.metadata.insert(key.clone(), v),
                None => record.metadata.remove(&key),
            };
            changed.push(format!("metadata.{key}"));
        }
        changed
    }
}

/// Owns the requirement records and the current selection.
pub struct CollectionManager {
    state: Mutex<CollectionState>,
    bus: Arc<EventBus>,
    workflow: Arc<WorkflowState>,
}

impl CollectionManager {
    pub fn new(bus: Arc<EventBus>, workflow: Arc<WorkflowState>) -> Self {
        Self {
            state: Mutex::new(CollectionState::default()),
            bus,
            workflow,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CollectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of all records in display order.
    pub fn snapshot(&self) -> Vec<Requirement> {
        self.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// First record with the given identifier.
    pub fn get(&self, global_id: &str) -> Option<Requirement> {
        let state = self.lock();
        state.position(global_id).map(|i| state.records[i].clone())
    }

    pub fn contains(&self, global_id: &str) -> bool {
        self.lock().position(global_id).is_some()
    }

    /// The selected record, if it is still in the collection.
    pub fn current(&self) -> Option<Requirement> {
        self.lock().current_record()
    }

    /// Records matching an analysis selection, in display order.
    pub fn filter(&self, selection: AnalysisSelection) -> Vec<Requirement> {
        self.lock()
            .records
            .iter()
            .filter(|r| selection.matches(r))
            .cloned()
            .collect()
    }

    /// Change the selection. `None` clears it.
    pub fn select(&self, global_id: Option<&str>, initiator: Initiator) -> ReqflowResult<()> {
        let selected = {
            let mut state = self.lock();
            match global_id {
                Some(id) => {
                    let index = state.position(id).ok_or_else(|| ReqflowError::not_found(id))?;
                    state.current = Some(id.to_string());
                    Some(state.records[index].clone())
                }
                None => {
                    state.current = None;
                    None
                }
            }
        };
        self.bus.publish(DomainEvent::SelectionChanged { selected, initiator });
        Ok(())
    }

    /// Append a record. Returns the new count.
    pub fn add(&self, requirement: Requirement) -> ReqflowResult<usize> {
        if !has_identifier(&requirement) {
            return Err(ReqflowError::validation("requirement identifier must not be empty"));
        }
        let new_count = {
            let mut state = self.lock();
            state.push(requirement.clone());
            state.records.len()
        };
        debug!(global_id = %requirement.global_id, new_count, "Requirement added");
        self.bus.publish(DomainEvent::CollectionChanged {
            action: CollectionAction::Add,
            affected: vec![requirement],
            new_count,
        });
        self.workflow.mark_dirty();
        Ok(new_count)
    }

    /// Append every candidate whose identifier is not present yet.
    ///
    /// Duplicates inside `candidates` are resolved first-seen-wins and
    /// candidates without an identifier are skipped. Publishes one
    /// `CollectionChanged(Add)` for the added records, or nothing if none were
    /// new.
    pub fn merge_missing(&self, candidates: Vec<Requirement>) -> MergeResult {
        let mut result = MergeResult::default();
        let new_count = {
            let mut state = self.lock();
            let mut seen: HashSet<String> = state.records.iter().map(|r| r.global_id.clone()).collect();
            for candidate in candidates {
                if !has_identifier(&candidate) {
                    warn!(name = %candidate.name, "Skipping requirement without identifier");
                    result.skipped += 1;
                } else if seen.insert(candidate.global_id.clone()) {
                    result.added.push(candidate);
                } else {
                    result.skipped += 1;
                }
            }
            for added in &result.added {
                state.push(added.clone());
            }
            state.records.len()
        };

        if result.added.is_empty() {
            return result;
        }
        debug!(added = result.added.len(), skipped = result.skipped, new_count, "Requirements merged");
        self.bus.publish(DomainEvent::CollectionChanged {
            action: CollectionAction::Add,
            affected: result.added.clone(),
            new_count,
        });
        self.workflow.mark_dirty();
        result
    }

    /// Remove the first record with `global_id`.
    ///
    /// If it was the current record, the first remaining record becomes
    /// current.
    pub fn remove(&self, global_id: &str) -> ReqflowResult<Requirement> {
        let (removed, new_count, reselected) = {
            let mut state = self.lock();
            let index = state.position(global_id).ok_or_else(|| ReqflowError::not_found(global_id))?;
            let removed = state.remove_at(index);
            let was_current = state.current.as_deref() == Some(global_id);
            let reselected = if was_current && state.position(global_id).is_none() {
                state.select_first();
                Some(state.current_record())
            } else {
                None
            };
            (removed, state.records.len(), reselected)
        };

        debug!(global_id, new_count, "Requirement removed");
        self.bus.publish(DomainEvent::CollectionChanged {
            action: CollectionAction::Remove,
            affected: vec![removed.clone()],
            new_count,
        });
        if let Some(selected) = reselected {
            self.bus.publish(DomainEvent::SelectionChanged {
                selected,
                initiator: Initiator::System,
            });
        }
        self.workflow.mark_dirty();
        Ok(removed)
    }

    /// Remove every record. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let (removed, had_current) = {
            let mut state = self.lock();
            let had_current = state.current.take().is_some();
            (state.reset(Vec::new()), had_current)
        };

        let count = removed.len();
        debug!(removed = count, "Collection cleared");
        self.bus.publish(DomainEvent::CollectionChanged {
            action: CollectionAction::Clear,
            affected: removed,
            new_count: 0,
        });
        if had_current {
            self.bus.publish(DomainEvent::SelectionChanged {
                selected: None,
                initiator: Initiator::System,
            });
        }
        self.workflow.mark_dirty();
        count
    }

    /// Replace all records with an imported set and select the first one.
    pub fn replace_all(&self, records: Vec<Requirement>) -> ReqflowResult<usize> {
        if records.is_empty() {
            return Err(ReqflowError::validation("cannot replace the collection with an empty set"));
        }
        if !records.iter().all(has_identifier) {
            return Err(ReqflowError::validation("requirement identifier must not be empty"));
        }
        let (new_count, selected) = {
            let mut state = self.lock();
            state.reset(records.clone());
            state.select_first();
            (state.records.len(), state.current_record())
        };

        debug!(new_count, "Collection replaced by import");
        self.bus.publish(DomainEvent::CollectionChanged {
            action: CollectionAction::Import,
            affected: records,
            new_count,
        });
        self.bus.publish(DomainEvent::SelectionChanged {
            selected,
            initiator: Initiator::Import,
        });
        self.workflow.mark_dirty();
        Ok(new_count)
    }

    /// Reload from the source of truth.
    ///
    /// An equivalent incoming set leaves the records untouched and only
    /// re-announces the current selection, so consumers keep their position.
    /// Either way the collection is clean afterwards.
    pub fn load(&self, records: Vec<Requirement>) -> LoadOutcome {
        let (outcome, selected, affected) = {
            let mut state = self.lock();
            if same_sequence(&state.records, &records) {
                let count = state.records.len();
                (LoadOutcome::Unchanged { count }, state.current_record(), None)
            } else {
                state.reset(records.clone());
                let keep = state.current.as_deref().is_some_and(|id| state.position(id).is_some());
                if !keep {
                    state.select_first();
                }
                let count = state.records.len();
                (LoadOutcome::Replaced { count }, state.current_record(), Some(records))
            }
        };

        debug!(?outcome, "Collection loaded");
        if let Some(affected) = affected {
            let new_count = affected.len();
            self.bus.publish(DomainEvent::CollectionChanged {
                action: CollectionAction::Load,
                affected,
                new_count,
            });
        }
        self.bus.publish(DomainEvent::SelectionChanged {
            selected,
            initiator: Initiator::Reload,
        });
        self.workflow.mark_clean();
        outcome
    }

    /// Edit display fields. Returns the changed field names; an edit that
    /// changes nothing publishes nothing.
    pub fn update_fields(&self, global_id: &str, update: FieldUpdate, initiator: Initiator) -> ReqflowResult<Vec<String>> {
        let (changed, requirement) = {
            let mut state = self.lock();
            let index = state.position(global_id).ok_or_else(|| ReqflowError::not_found(global_id))?;
            let record = &mut state.records[index];
            let changed = update.apply(record);
            (changed, record.clone())
        };

        if changed.is_empty() {
            return Ok(changed);
        }
        debug!(global_id, fields = ?changed, "Requirement fields updated");
        self.bus.publish(DomainEvent::FieldUpdated {
            requirement,
            fields: changed.clone(),
            initiator,
        });
        self.workflow.mark_dirty();
        Ok(changed)
    }

    /// Replace the analysis of the first record with `global_id`.
    pub fn attach_analysis(&self, global_id: &str, analysis: Analysis) -> ReqflowResult<Requirement> {
        let key = {
            let state = self.lock();
            let index = state.position(global_id).ok_or_else(|| ReqflowError::not_found(global_id))?;
            state.keys[index]
        };
        self.attach_analysis_at(key, analysis)
            .ok_or_else(|| ReqflowError::not_found(global_id))
    }

    /// First record with `global_id` together with its key.
    pub fn locate(&self, global_id: &str) -> Option<(RecordKey, Requirement)> {
        let state = self.lock();
        state
            .position(global_id)
            .map(|i| (state.keys[i], state.records[i].clone()))
    }

    /// Match each of `records` to a distinct slot of the collection.
    ///
    /// A record claims the first unclaimed slot with the same identifier and
    /// equivalent content, falling back to the first unclaimed slot with the
    /// same identifier. `None` means no slot is left for it.
    pub fn resolve_keys(&self, records: &[Requirement]) -> Vec<Option<RecordKey>> {
        let state = self.lock();
        let mut claimed: HashSet<RecordKey> = HashSet::new();
        records
            .iter()
            .map(|wanted| {
                let candidates: Vec<usize> = (0..state.records.len())
                    .filter(|&i| state.records[i].global_id == wanted.global_id && !claimed.contains(&state.keys[i]))
                    .collect();
                let index = candidates
                    .iter()
                    .copied()
                    .find(|&i| is_equivalent(&state.records[i], wanted))
                    .or_else(|| candidates.first().copied())?;
                claimed.insert(state.keys[index]);
                Some(state.keys[index])
            })
            .collect()
    }

    /// Replace the analysis of the record in slot `key`. `None` if the record
    /// is gone.
    pub fn attach_analysis_at(&self, key: RecordKey, analysis: Analysis) -> Option<Requirement> {
        let requirement = {
            let mut state = self.lock();
            let index = state.position_of_key(key)?;
            let record = &mut state.records[index];
            record.analysis = Some(analysis);
            record.clone()
        };

        self.bus.publish(DomainEvent::FieldUpdated {
            requirement: requirement.clone(),
            fields: vec!["analysis".to_string()],
            initiator: Initiator::Analysis,
        });
        self.workflow.mark_dirty();
        Some(requirement)
    }
}
