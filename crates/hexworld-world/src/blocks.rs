//! Block definitions and capability lookups.
//!
//! The world core never hardcodes content ids. Physics, lighting and
//! meshing ask the registry about capabilities (`is_solid`,
//! `is_light_permeable`, `is_liquid`, ...) by id.

use ahash::AHashMap;
use hexworld_common::VoxelPos;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Block registry errors.
#[derive(Debug, Error)]
pub enum BlockError {
    /// Definition file could not be parsed
    #[error("Failed to parse block definitions: {0}")]
    Parse(#[from] serde_json::Error),

    /// Id 0 is reserved for air
    #[error("Block {0:?} uses reserved id 0")]
    ReservedId(String),

    /// Two definitions share an id
    #[error("Duplicate block id {0}")]
    DuplicateId(u8),
}

/// Result type for registry operations.
pub type BlockResult<T> = Result<T, BlockError>;

/// Read access to block ids by global position.
pub trait BlockSource {
    /// Block id at a global position, 0 when the owning chunk is absent.
    fn block_at(&self, pos: VoxelPos) -> u8;
}

/// Static properties of one block type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockDef {
    /// Numeric id stored in chunk arrays
    pub id: u8,
    /// Unique name, e.g. "stone"
    pub name: String,
    /// Solid when greater than zero
    pub hardness: f32,
    /// Light and faces pass through fully
    pub transparent: bool,
    /// Light passes, rendered partially see-through
    pub translucent: bool,
    /// Emitted light, 0 for non-sources
    pub light_level: u8,
    /// Fluid the actor can be submerged in
    pub is_liquid: bool,
    /// Rendered with a glowing outline
    pub emissive_outline: bool,
}

impl Default for BlockDef {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            hardness: 1.0,
            transparent: false,
            translucent: false,
            light_level: 0,
            is_liquid: false,
            emissive_outline: false,
        }
    }
}

impl BlockDef {
    /// Creates an opaque solid block.
    #[must_use]
    pub fn solid(id: u8, name: &str, hardness: f32) -> Self {
        Self {
            id,
            name: name.to_string(),
            hardness,
            ..Self::default()
        }
    }
}

/// Lookup table from block id to definition.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    defs: Vec<Option<BlockDef>>,
    by_name: AHashMap<String, u8>,
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl BlockRegistry {
    /// Creates a registry containing only air.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            defs: vec![None; 256],
            by_name: AHashMap::new(),
        }
    }

    /// Builds a registry from definitions.
    pub fn from_defs(defs: impl IntoIterator<Item = BlockDef>) -> BlockResult<Self> {
        let mut registry = Self::empty();
        for def in defs {
            registry.register(def)?;
        }
        Ok(registry)
    }

    /// Parses a JSON array of definitions (camelCase keys, unknown keys ignored).
    pub fn from_json(json: &str) -> BlockResult<Self> {
        let defs: Vec<BlockDef> = serde_json::from_str(json)?;
        let registry = Self::from_defs(defs)?;
        debug!("Loaded {} block types", registry.len());
        Ok(registry)
    }

    /// Built-in palette used when no definition file is supplied.
    #[must_use]
    pub fn with_defaults() -> Self {
        let defs = [
            BlockDef::solid(1, "grass", 0.6),
            BlockDef::solid(2, "dirt", 0.5),
            BlockDef::solid(3, "stone", 1.5),
            BlockDef::solid(4, "sand", 0.5),
            BlockDef {
                hardness: 0.0,
                translucent: true,
                is_liquid: true,
                ..BlockDef::solid(5, "water", 0.0)
            },
            BlockDef::solid(6, "bedrock", 100.0),
            BlockDef::solid(7, "wood", 2.0),
            BlockDef {
                translucent: true,
                ..BlockDef::solid(8, "leaves", 0.2)
            },
            BlockDef {
                transparent: true,
                ..BlockDef::solid(9, "glass", 0.3)
            },
            BlockDef {
                transparent: true,
                light_level: 14,
                ..BlockDef::solid(10, "torch", 0.1)
            },
            BlockDef {
                light_level: 15,
                emissive_outline: true,
                ..BlockDef::solid(11, "lamp", 0.3)
            },
        ];

        let mut registry = Self::empty();
        for def in defs {
            let id = def.id;
            registry.by_name.insert(def.name.clone(), id);
            registry.defs[usize::from(id)] = Some(def);
        }
        registry
    }

    /// Registers a definition. Ids must be unique and non-zero.
    pub fn register(&mut self, def: BlockDef) -> BlockResult<()> {
        if def.id == 0 {
            return Err(BlockError::ReservedId(def.name));
        }
        let slot = &mut self.defs[usize::from(def.id)];
        if slot.is_some() {
            return Err(BlockError::DuplicateId(def.id));
        }
        self.by_name.insert(def.name.clone(), def.id);
        *slot = Some(def);
        Ok(())
    }

    /// Number of registered block types, excluding air.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no block types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Definition for an id.
    #[must_use]
    pub fn get(&self, id: u8) -> Option<&BlockDef> {
        self.defs[usize::from(id)].as_ref()
    }

    /// Id for a name, 0 when unknown.
    #[must_use]
    pub fn id_of(&self, name: &str) -> u8 {
        self.by_name.get(name).copied().unwrap_or(0)
    }

    /// Whether the block collides (`hardness > 0`). Air and unknown ids never do.
    #[must_use]
    pub fn is_solid(&self, id: u8) -> bool {
        id != 0 && self.get(id).is_some_and(|d| d.hardness > 0.0)
    }

    /// Whether light can flow into the cell: empty, see-through, or a source.
    #[must_use]
    pub fn is_light_permeable(&self, id: u8) -> bool {
        if id == 0 {
            return true;
        }
        self.get(id)
            .map_or(true, |d| d.transparent || d.translucent || d.light_level > 0)
    }

    /// Whether a face bordering this cell should be drawn.
    #[must_use]
    pub fn is_see_through(&self, id: u8) -> bool {
        id == 0 || self.get(id).map_or(true, |d| d.transparent || d.translucent)
    }

    /// Whether the block is solid and blocks sight.
    #[must_use]
    pub fn is_opaque_solid(&self, id: u8) -> bool {
        self.is_solid(id) && !self.is_see_through(id)
    }

    /// Emitted light level, 0 for non-sources.
    #[must_use]
    pub fn light_level(&self, id: u8) -> u8 {
        self.get(id).map_or(0, |d| d.light_level)
    }

    /// Whether the block is a liquid.
    #[must_use]
    pub fn is_liquid(&self, id: u8) -> bool {
        self.get(id).is_some_and(|d| d.is_liquid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let blocks = BlockRegistry::with_defaults();
        assert_eq!(blocks.id_of("stone"), 3);
        assert_eq!(blocks.id_of("missing"), 0);
        assert!(blocks.is_solid(blocks.id_of("stone")));
        assert!(!blocks.is_solid(0));
        assert!(!blocks.is_solid(blocks.id_of("water")));
        assert!(blocks.is_liquid(blocks.id_of("water")));
        assert_eq!(blocks.light_level(blocks.id_of("torch")), 14);
    }

    #[test]
    fn test_light_permeability() {
        let blocks = BlockRegistry::with_defaults();
        assert!(blocks.is_light_permeable(0));
        assert!(blocks.is_light_permeable(blocks.id_of("glass")));
        assert!(blocks.is_light_permeable(blocks.id_of("leaves")));
        assert!(blocks.is_light_permeable(blocks.id_of("lamp")));
        assert!(!blocks.is_light_permeable(blocks.id_of("stone")));
    }

    #[test]
    fn test_from_json() {
        let json = r##"[
            {"id": 1, "name": "rock", "hardness": 2.0, "topColor": "#777"},
            {"id": 2, "name": "crystal", "hardness": 1.0, "transparent": true, "lightLevel": 9},
            {"id": 3, "name": "lava", "hardness": 0, "isLiquid": true, "lightLevel": 15}
        ]"##;
        let blocks = BlockRegistry::from_json(json).expect("valid json");
        assert_eq!(blocks.len(), 3);
        assert!(blocks.is_solid(1));
        assert!(blocks.is_opaque_solid(1));
        assert_eq!(blocks.light_level(2), 9);
        assert!(blocks.is_liquid(3));
        assert!(!blocks.is_solid(3));
    }

    #[test]
    fn test_rejects_bad_ids() {
        let dup = [BlockDef::solid(4, "a", 1.0), BlockDef::solid(4, "b", 1.0)];
        assert!(matches!(
            BlockRegistry::from_defs(dup),
            Err(BlockError::DuplicateId(4))
        ));
        assert!(matches!(
            BlockRegistry::from_defs([BlockDef::solid(0, "void", 1.0)]),
            Err(BlockError::ReservedId(_))
        ));
        assert!(BlockRegistry::from_json("not json").is_err());
    }
}
