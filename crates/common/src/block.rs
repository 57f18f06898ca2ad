use serde::{Deserialize, Serialize};

/// Block identity.
///
/// A reduced palette: enough variety for abilities to tell terrain, liquids,
/// transparent filler and ability-placed transients apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Material {
    Air,
    Stone,
    Cobblestone,
    Dirt,
    Grass,
    Sand,
    Gravel,
    Clay,
    IronBlock,
    Magma,
    Obsidian,
    Bedrock,
    Ice,
    PackedIce,
    Snow,
    Water,
    Lava,
    Fire,
    TallGrass,
    Glass,
}

impl Material {
    pub fn is_air(self) -> bool {
        matches!(self, Self::Air)
    }

    pub fn is_liquid(self) -> bool {
        matches!(self, Self::Water | Self::Lava)
    }

    /// Blocks an entity can move through.
    pub fn is_passable(self) -> bool {
        matches!(
            self,
            Self::Air | Self::Water | Self::Lava | Self::Fire | Self::TallGrass | Self::Snow
        )
    }

    pub fn is_solid(self) -> bool {
        !self.is_passable()
    }

    /// Air-like filler that abilities may overwrite freely.
    pub fn is_transparent(self) -> bool {
        matches!(self, Self::Air | Self::Fire | Self::TallGrass | Self::Snow)
    }

    pub fn is_earthbendable(self) -> bool {
        matches!(
            self,
            Self::Stone
                | Self::Cobblestone
                | Self::Dirt
                | Self::Grass
                | Self::Sand
                | Self::Gravel
                | Self::Clay
                | Self::IronBlock
                | Self::Magma
        )
    }

    pub fn is_metal(self) -> bool {
        matches!(self, Self::IronBlock)
    }

    pub fn is_ice(self) -> bool {
        matches!(self, Self::Ice | Self::PackedIce)
    }

    /// Blocks no ability may replace.
    pub fn is_unbreakable(self) -> bool {
        matches!(self, Self::Bedrock | Self::Obsidian)
    }

    /// The solid counterpart shown while earth is being moved.
    pub fn solid_type(self) -> Material {
        match self {
            Self::Sand => Self::Stone,
            Self::Gravel => Self::Stone,
            Self::Grass => Self::Dirt,
            other => other,
        }
    }
}

/// Block identity plus a small data value (liquid level, growth stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    pub material: Material,
    pub data: u8,
}

impl BlockState {
    pub const AIR: BlockState = BlockState::of(Material::Air);

    pub const fn of(material: Material) -> Self {
        Self { material, data: 0 }
    }

    pub const fn with_data(material: Material, data: u8) -> Self {
        Self { material, data }
    }

    pub fn is_air(self) -> bool {
        self.material.is_air()
    }

    pub fn is_liquid(self) -> bool {
        self.material.is_liquid()
    }

    pub fn is_passable(self) -> bool {
        self.material.is_passable()
    }

    pub fn is_solid(self) -> bool {
        self.material.is_solid()
    }
}

impl Default for BlockState {
    fn default() -> Self {
        Self::AIR
    }
}

impl From<Material> for BlockState {
    fn from(material: Material) -> Self {
        Self::of(material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liquids_are_passable_not_solid() {
        assert!(Material::Water.is_liquid());
        assert!(Material::Water.is_passable());
        assert!(!Material::Water.is_solid());
    }

    #[test]
    fn terrain_is_solid_and_bendable() {
        assert!(Material::Stone.is_solid());
        assert!(Material::Stone.is_earthbendable());
        assert!(!Material::Bedrock.is_earthbendable());
        assert!(Material::Bedrock.is_unbreakable());
    }

    #[test]
    fn loose_material_solidifies() {
        assert_eq!(Material::Sand.solid_type(), Material::Stone);
        assert_eq!(Material::Dirt.solid_type(), Material::Dirt);
    }

    #[test]
    fn default_state_is_air() {
        assert!(BlockState::default().is_air());
        assert_eq!(BlockState::from(Material::Lava).data, 0);
    }
}
