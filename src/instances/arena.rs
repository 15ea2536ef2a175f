use crate::{instances::Instance, DynSvc, InjectError};
use parking_lot::Mutex;
use std::{collections::HashMap, sync::Arc};

/// A handle to an instance. Handles stay unique after the instance is
/// removed: a reused slot gets a new generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId {
    index: usize,
    generation: u64,
}

enum Slot {
    Occupied { generation: u64, instance: Instance },
    Vacant { generation: u64 },
}

/// Storage for every instance of an injector hierarchy. The parent and child
/// links between instances are handles into this arena, so cycles between
/// instances do not keep anything alive.
#[derive(Default)]
pub(crate) struct InstanceArena {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_value: HashMap<usize, InstanceId>,
}

pub(crate) type SharedArena = Arc<Mutex<InstanceArena>>;

fn address(value: &DynSvc) -> usize {
    Arc::as_ptr(value).cast::<()>() as usize
}

impl InstanceArena {
    pub(crate) fn insert(&mut self, instance: Instance) -> InstanceId {
        if let Some(index) = self.free.pop() {
            let generation = match &self.slots[index] {
                Slot::Vacant { generation } => generation + 1,
                Slot::Occupied { generation, .. } => generation + 1,
            };
            self.slots[index] = Slot::Occupied {
                generation,
                instance,
            };
            InstanceId { index, generation }
        } else {
            self.slots.push(Slot::Occupied {
                generation: 0,
                instance,
            });
            InstanceId {
                index: self.slots.len() - 1,
                generation: 0,
            }
        }
    }

    pub(crate) fn get(&self, id: InstanceId) -> Option<&Instance> {
        match self.slots.get(id.index)? {
            Slot::Occupied {
                generation,
                instance,
            } if *generation == id.generation => Some(instance),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: InstanceId) -> Option<&mut Instance> {
        match self.slots.get_mut(id.index)? {
            Slot::Occupied {
                generation,
                instance,
            } if *generation == id.generation => Some(instance),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, id: InstanceId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn remove(&mut self, id: InstanceId) -> Option<Instance> {
        self.get(id)?;
        let slot = std::mem::replace(
            &mut self.slots[id.index],
            Slot::Vacant {
                generation: id.generation,
            },
        );
        self.free.push(id.index);
        self.by_value.retain(|_, value| *value != id);
        match slot {
            Slot::Occupied { instance, .. } => Some(instance),
            Slot::Vacant { .. } => None,
        }
    }

    /// Records that `parent` depends on `child`.
    pub(crate) fn link(&mut self, parent: InstanceId, child: InstanceId) {
        if parent == child || !self.contains(child) {
            return;
        }
        if let Some(instance) = self.get_mut(parent) {
            instance.children.insert(child);
        } else {
            return;
        }
        if let Some(instance) = self.get_mut(child) {
            instance.parents.insert(parent);
        }
    }

    /// Resets a failed construction together with the cycle members that
    /// were waiting on it, so a retry rebuilds the whole cycle.
    pub(crate) fn reset_cycle(&mut self, root: InstanceId, error: &InjectError) {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            let Some(instance) = self.get_mut(id) else {
                continue;
            };
            if !instance.is_pending() {
                continue;
            }
            pending.extend(instance.chain.iter().copied());
            instance.reset(error);
        }
    }

    pub(crate) fn register_value(&mut self, id: InstanceId, value: &DynSvc) {
        self.by_value.insert(address(value), id);
    }

    /// Finds the instance that produced a value.
    pub(crate) fn find_by_value(&self, value: &DynSvc) -> Option<InstanceId> {
        self.by_value
            .get(&address(value))
            .copied()
            .filter(|id| self.contains(*id))
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Occupied { .. }))
            .count()
    }
}
