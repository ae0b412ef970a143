use std::collections::BTreeMap;
use std::sync::Arc;

use super::controller::{FormController, FormResult, read_lock, write_lock};
use super::validation::RuleSet;
use super::value::FieldKey;

pub type FieldChangeListener = Arc<dyn Fn(&FieldKey, Option<&FieldKey>) + Send + Sync>;

/// Stable identity of a mounted field binder. Survives renames; a freed slot is reused
/// with a new generation so stale ids never alias a later binder.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldId {
    index: u32,
    generation: u32,
}

#[derive(Clone, Debug)]
struct FieldSlot {
    generation: u32,
    field: Option<FieldKey>,
    mount_seq: u64,
}

/// Mounted binders plus the single active rule set per field name.
///
/// Rule sets are not dropped when a binder unmounts; they stay active until another
/// registration replaces them or the form is recreated.
#[derive(Default)]
pub struct FieldRegistry {
    slots: Vec<FieldSlot>,
    free: Vec<u32>,
    rules: BTreeMap<FieldKey, RuleSet>,
    registration_order: Vec<FieldKey>,
    listeners: Vec<FieldChangeListener>,
    next_seq: u64,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mount(&mut self, field: FieldKey) -> FieldId {
        let mount_seq = self.next_seq;
        self.next_seq += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.field = Some(field);
            slot.mount_seq = mount_seq;
            return FieldId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(FieldSlot {
            generation: 0,
            field: Some(field),
            mount_seq,
        });
        FieldId {
            index,
            generation: 0,
        }
    }

    /// Points a mounted binder at a new field name and returns the previous one.
    pub fn rename(&mut self, id: FieldId, field: FieldKey) -> Option<FieldKey> {
        let slot = self.slot_mut(id)?;
        slot.field.replace(field)
    }

    pub fn unmount(&mut self, id: FieldId) -> Option<FieldKey> {
        let slot = self.slot_mut(id)?;
        let field = slot.field.take();
        self.free.push(id.index);
        if let Some(field) = &field {
            if self.rules.contains_key(field) {
                tracing::debug!(field = %field, "field unmounted, rule set stays active");
            }
        }
        field
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldKey> {
        self.slot(id).and_then(|slot| slot.field.as_ref())
    }

    pub fn is_mounted(&self, id: FieldId) -> bool {
        self.field(id).is_some()
    }

    /// Names of mounted binders in mount order.
    pub fn mounted_fields(&self) -> Vec<FieldKey> {
        let mut mounted = self
            .slots
            .iter()
            .filter_map(|slot| slot.field.clone().map(|field| (slot.mount_seq, field)))
            .collect::<Vec<_>>();
        mounted.sort_by_key(|(seq, _)| *seq);
        mounted.into_iter().map(|(_, field)| field).collect()
    }

    /// Last write wins; returns whether an earlier rule set was replaced.
    pub fn register(&mut self, field: FieldKey, rules: RuleSet) -> bool {
        let replaced = self.rules.insert(field.clone(), rules).is_some();
        if !replaced {
            self.registration_order.push(field);
        }
        replaced
    }

    pub fn rules(&self, field: &FieldKey) -> Option<&RuleSet> {
        self.rules.get(field)
    }

    /// Every active rule set in first-registration order.
    pub fn active_rules(&self) -> Vec<(FieldKey, RuleSet)> {
        self.registration_order
            .iter()
            .filter_map(|field| {
                self.rules
                    .get(field)
                    .map(|rules| (field.clone(), rules.clone()))
            })
            .collect()
    }

    pub fn add_listener(&mut self, listener: FieldChangeListener) {
        self.listeners.push(listener);
    }

    pub(super) fn listeners(&self) -> Vec<FieldChangeListener> {
        self.listeners.clone()
    }

    fn slot(&self, id: FieldId) -> Option<&FieldSlot> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    fn slot_mut(&mut self, id: FieldId) -> Option<&mut FieldSlot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation && slot.field.is_some())
    }
}

impl FormController {
    /// Registers `rules` as the active rule set for `field`.
    pub fn add_item(&self, field: impl Into<FieldKey>, rules: RuleSet) -> FormResult<()> {
        let field = field.into();
        let replaced =
            write_lock(&self.registry, "registering field rules")?.register(field.clone(), rules);
        tracing::trace!(field = %field, replaced, "field rules registered");
        Ok(())
    }

    pub fn mount_field(&self, field: impl Into<FieldKey>) -> FormResult<FieldId> {
        let field = field.into();
        let (id, listeners) = {
            let mut registry = write_lock(&self.registry, "mounting field")?;
            (registry.mount(field.clone()), registry.listeners())
        };
        for listener in listeners {
            listener(&field, None);
        }
        Ok(id)
    }

    pub fn rename_field(&self, id: FieldId, field: impl Into<FieldKey>) -> FormResult<()> {
        let field = field.into();
        let (previous, listeners) = {
            let mut registry = write_lock(&self.registry, "renaming field")?;
            (registry.rename(id, field.clone()), registry.listeners())
        };
        if previous.as_ref() == Some(&field) {
            return Ok(());
        }
        for listener in listeners {
            listener(&field, previous.as_ref());
        }
        Ok(())
    }

    pub fn unmount_field(&self, id: FieldId) -> FormResult<()> {
        write_lock(&self.registry, "unmounting field")?.unmount(id);
        Ok(())
    }

    /// Subscribes to field name changes; first mounts report no previous name.
    pub fn on_field_change(
        &self,
        listener: impl Fn(&FieldKey, Option<&FieldKey>) + Send + Sync + 'static,
    ) -> FormResult<()> {
        write_lock(&self.registry, "registering field change listener")?
            .add_listener(Arc::new(listener));
        Ok(())
    }

    pub fn mounted_fields(&self) -> FormResult<Vec<FieldKey>> {
        Ok(read_lock(&self.registry, "reading mounted fields")?.mounted_fields())
    }

    pub fn registered_rules(&self, field: &FieldKey) -> FormResult<Option<RuleSet>> {
        Ok(read_lock(&self.registry, "reading registered rules")?
            .rules(field)
            .cloned())
    }
}
