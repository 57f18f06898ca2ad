//! Resolved numeric configuration and the engine-wide settings file.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use bendsim_common::TICK_MILLIS;
use serde::{Deserialize, Serialize};

/// A tunable number on an archetype. Time-like attributes are milliseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Range,
    SelectionRange,
    Speed,
    Damage,
    Cooldown,
    Duration,
    Radius,
    ChargeTime,
    Amount,
    Height,
    Strength,
    FireTicks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierKind {
    /// Added to the base value.
    Additive,
    /// Percentages are summed, then applied once: two +10% make +20%.
    SummedPercentage,
    /// Applied one after another: two x1.1 make x1.21.
    Multiplicative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttributeModifier {
    pub attribute: Attribute,
    pub kind: ModifierKind,
    pub value: f64,
}

impl AttributeModifier {
    pub fn new(attribute: Attribute, kind: ModifierKind, value: f64) -> Self {
        Self {
            attribute,
            kind,
            value,
        }
    }
}

/// Attribute values of one archetype.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet {
    values: BTreeMap<Attribute, f64>,
}

impl AttributeSet {
    pub const EMPTY: AttributeSet = AttributeSet {
        values: BTreeMap::new(),
    };

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: Attribute, value: f64) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn set(&mut self, attribute: Attribute, value: f64) {
        self.values.insert(attribute, value);
    }

    pub fn get(&self, attribute: Attribute) -> Option<f64> {
        self.values.get(&attribute).copied()
    }

    pub fn get_or(&self, attribute: Attribute, default: f64) -> f64 {
        self.get(attribute).unwrap_or(default)
    }

    /// A time-like attribute as a duration. Negative values clamp to zero.
    pub fn millis(&self, attribute: Attribute) -> Duration {
        let ms = self.get_or(attribute, 0.0).max(0.0);
        Duration::from_millis(ms.round() as u64)
    }

    /// Values from `overrides` replace ours.
    pub fn merged(&self, overrides: &AttributeSet) -> AttributeSet {
        let mut out = self.clone();
        out.values
            .extend(overrides.values.iter().map(|(k, v)| (*k, *v)));
        out
    }

    /// Apply modifiers: additive first, then the summed percentage, then
    /// each multiplier.
    pub fn modified(&self, modifiers: &[AttributeModifier]) -> AttributeSet {
        let mut out = self.clone();
        for (attribute, value) in out.values.iter_mut() {
            let relevant = modifiers.iter().filter(|m| m.attribute == *attribute);
            let mut add = 0.0;
            let mut pct = 0.0;
            let mut mul = 1.0;
            for m in relevant {
                match m.kind {
                    ModifierKind::Additive => add += m.value,
                    ModifierKind::SummedPercentage => pct += m.value,
                    ModifierKind::Multiplicative => mul *= m.value,
                }
            }
            *value = (*value + add) * (1.0 + pct / 100.0) * mul;
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, f64)> + '_ {
        self.values.iter().map(|(k, v)| (*k, *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A collision rule written with archetype names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionRuleConfig {
    pub first: String,
    pub second: String,
    #[serde(default)]
    pub remove_first: bool,
    #[serde(default)]
    pub remove_second: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("tick_millis must be positive")]
    ZeroTick,
    #[error("attribute {attribute:?} of {archetype} is not finite")]
    NonFinite {
        archetype: String,
        attribute: Attribute,
    },
}

/// Engine-wide settings. Every field has a default, so a config file only
/// needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_millis: u64,
    pub earth_revert_ms: u64,
    /// Actions remembered per actor for sequence matching.
    pub sequence_history: usize,
    /// Actions older than this no longer count towards a sequence.
    pub sequence_window_ms: u64,
    /// Archetype names that refuse to activate.
    pub disabled: BTreeSet<String>,
    /// Per-archetype attribute overrides by name.
    pub attributes: BTreeMap<String, AttributeSet>,
    pub modifiers: BTreeMap<String, Vec<AttributeModifier>>,
    pub collisions: Vec<CollisionRuleConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_millis: TICK_MILLIS,
            earth_revert_ms: 300_000,
            sequence_history: 16,
            sequence_window_ms: 10_000,
            disabled: BTreeSet::new(),
            attributes: BTreeMap::new(),
            modifiers: BTreeMap::new(),
            collisions: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_millis == 0 {
            return Err(ConfigError::ZeroTick);
        }
        for (archetype, set) in &self.attributes {
            if let Some((attribute, _)) = set.iter().find(|(_, v)| !v.is_finite()) {
                return Err(ConfigError::NonFinite {
                    archetype: archetype.clone(),
                    attribute,
                });
            }
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis)
    }

    pub fn earth_revert(&self) -> Duration {
        Duration::from_millis(self.earth_revert_ms)
    }

    pub fn sequence_window(&self) -> Duration {
        Duration::from_millis(self.sequence_window_ms)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    /// Base attributes with this config's overrides and modifiers applied.
    pub fn resolve(&self, name: &str, base: &AttributeSet) -> AttributeSet {
        let merged = match by_name(&self.attributes, name) {
            Some(overrides) => base.merged(overrides),
            None => base.clone(),
        };
        match by_name(&self.modifiers, name) {
            Some(mods) => merged.modified(mods),
            None => merged,
        }
    }
}

/// Archetype names are matched case-insensitively.
fn by_name<'a, V>(map: &'a BTreeMap<String, V>, name: &str) -> Option<&'a V> {
    map.iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_apply_in_order() {
        let base = AttributeSet::new().with(Attribute::Range, 10.0);
        let mods = [
            AttributeModifier::new(Attribute::Range, ModifierKind::Multiplicative, 2.0),
            AttributeModifier::new(Attribute::Range, ModifierKind::Additive, 2.0),
            AttributeModifier::new(Attribute::Range, ModifierKind::SummedPercentage, 25.0),
            AttributeModifier::new(Attribute::Range, ModifierKind::SummedPercentage, 25.0),
            AttributeModifier::new(Attribute::Speed, ModifierKind::Additive, 100.0),
        ];
        let out = base.modified(&mods);
        // (10 + 2) * 1.5 * 2
        assert_eq!(out.get(Attribute::Range), Some(36.0));
        // Modifiers never invent attributes.
        assert_eq!(out.get(Attribute::Speed), None);
    }

    #[test]
    fn millis_clamps_negative() {
        let set = AttributeSet::new()
            .with(Attribute::Cooldown, -5.0)
            .with(Attribute::Duration, 1500.4);
        assert_eq!(set.millis(Attribute::Cooldown), Duration::ZERO);
        assert_eq!(set.millis(Attribute::Duration), Duration::from_millis(1500));
        assert_eq!(set.millis(Attribute::ChargeTime), Duration::ZERO);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{
                "earth_revert_ms": 500,
                "disabled": ["EarthTunnel"],
                "attributes": { "airblast": { "range": 30.0 } },
                "collisions": [{ "first": "airblast", "second": "fireshield", "remove_first": true }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.tick_millis, TICK_MILLIS);
        assert_eq!(config.earth_revert(), Duration::from_millis(500));
        assert!(config.is_disabled("earthtunnel"));
        assert!(!config.collisions[0].remove_second);

        let base = AttributeSet::new().with(Attribute::Range, 20.0).with(Attribute::Speed, 1.0);
        let resolved = config.resolve("AirBlast", &base);
        assert_eq!(resolved.get(Attribute::Range), Some(30.0));
        assert_eq!(resolved.get(Attribute::Speed), Some(1.0));
    }

    #[test]
    fn zero_tick_rejected() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "tick_millis": 0 }"#),
            Err(ConfigError::ZeroTick)
        ));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            EngineConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
