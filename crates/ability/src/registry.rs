use std::collections::BTreeMap;

use crate::archetype::{AbilityDescriptor, ActivationMethod, Archetype, ArchetypeId, Element};
use crate::config::{AttributeSet, EngineConfig};
use crate::error::RegistryError;
use crate::sequence::{Action, ActionHistory, Sequence};

struct Registered {
    descriptor: AbilityDescriptor,
    archetype: Box<dyn Archetype>,
    enabled: bool,
    /// Descriptor attributes with config overrides and modifiers applied.
    attributes: AttributeSet,
}

/// Every archetype a session can activate, keyed by registration order.
///
/// Names are matched case-insensitively.
#[derive(Default)]
pub struct AbilityRegistry {
    entries: BTreeMap<ArchetypeId, Registered>,
    by_name: BTreeMap<String, ArchetypeId>,
    sequences: Vec<Sequence>,
}

impl std::fmt::Debug for AbilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(id, r)| (id, &r.descriptor.name)))
            .finish()
    }
}

impl AbilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        descriptor: AbilityDescriptor,
        archetype: impl Archetype + 'static,
    ) -> Result<ArchetypeId, RegistryError> {
        let key = descriptor.name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.by_name.contains_key(&key) {
            return Err(RegistryError::Duplicate(descriptor.name));
        }
        let id = ArchetypeId(self.entries.len() as u32);
        tracing::debug!(
            %id,
            name = %descriptor.name,
            element = %descriptor.element,
            "archetype registered"
        );
        self.by_name.insert(key, id);
        self.entries.insert(
            id,
            Registered {
                attributes: descriptor.attributes.clone(),
                descriptor,
                archetype: Box::new(archetype),
                enabled: true,
            },
        );
        Ok(id)
    }

    /// Bind a sequence of `(archetype name, method)` steps to the `combo`
    /// archetype. Each combo has at most one sequence.
    pub fn register_sequence(
        &mut self,
        combo: &str,
        steps: &[(&str, ActivationMethod)],
    ) -> Result<ArchetypeId, RegistryError> {
        let combo_id = self
            .id_of(combo)
            .ok_or_else(|| RegistryError::Unknown(combo.to_string()))?;
        if steps.is_empty() {
            return Err(RegistryError::EmptySequence(combo.to_string()));
        }
        if self.sequences.iter().any(|s| s.combo == combo_id) {
            return Err(RegistryError::Duplicate(combo.to_string()));
        }
        let steps = steps
            .iter()
            .map(|(name, method)| {
                self.id_of(name)
                    .map(|id| Action::new(id, *method))
                    .ok_or_else(|| RegistryError::Unknown(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(combo = %combo_id, steps = steps.len(), "sequence registered");
        self.sequences.push(Sequence {
            combo: combo_id,
            steps,
        });
        Ok(combo_id)
    }

    /// The sequence `history` completes. The longest match wins, then the
    /// earliest registered.
    pub fn completed_sequence(&self, history: &ActionHistory) -> Option<&Sequence> {
        self.sequences
            .iter()
            .rev()
            .filter(|s| s.matches(history))
            .max_by_key(|s| s.steps.len())
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    /// Re-resolve attributes and enabled flags from `config`.
    pub fn apply_config(&mut self, config: &EngineConfig) {
        for entry in self.entries.values_mut() {
            let name = &entry.descriptor.name;
            entry.attributes = config.resolve(name, &entry.descriptor.attributes);
            entry.enabled = !config.is_disabled(name);
        }
    }

    pub fn id_of(&self, name: &str) -> Option<ArchetypeId> {
        self.by_name.get(&name.trim().to_ascii_lowercase()).copied()
    }

    pub fn descriptor(&self, id: ArchetypeId) -> Option<&AbilityDescriptor> {
        self.entries.get(&id).map(|e| &e.descriptor)
    }

    pub fn archetype(&self, id: ArchetypeId) -> Option<&dyn Archetype> {
        self.entries.get(&id).map(|e| &*e.archetype)
    }

    pub fn attributes(&self, id: ArchetypeId) -> Option<&AttributeSet> {
        self.entries.get(&id).map(|e| &e.attributes)
    }

    pub fn is_enabled(&self, id: ArchetypeId) -> bool {
        self.entries.get(&id).is_some_and(|e| e.enabled)
    }

    pub fn set_enabled(&mut self, id: ArchetypeId, enabled: bool) -> bool {
        match self.entries.get_mut(&id) {
            Some(e) => {
                e.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Display name, or `"?"` for an unknown id.
    pub fn name(&self, id: ArchetypeId) -> &str {
        self.descriptor(id).map_or("?", |d| d.name.as_str())
    }

    /// Passive archetypes of one element.
    pub fn passives(&self, element: Element) -> impl Iterator<Item = ArchetypeId> + '_ {
        self.entries
            .iter()
            .filter(move |(_, e)| e.descriptor.element == element && e.descriptor.is_passive())
            .map(|(id, _)| *id)
    }

    /// Registered descriptors, hidden ones included.
    pub fn iter(&self) -> impl Iterator<Item = (ArchetypeId, &AbilityDescriptor)> {
        self.entries.iter().map(|(id, e)| (*id, &e.descriptor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
