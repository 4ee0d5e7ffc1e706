use std::fmt;

use serde::{Deserialize, Serialize};

pub const MAX_HEALTH: f32 = 20.0;
pub const MAX_FOOD: u32 = 20;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn distance_to(self, other: Vec3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn floored(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// Integer block coordinate.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn center(self) -> Vec3 {
        Vec3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y) + 0.5,
            f64::from(self.z) + 0.5,
        )
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ItemStack {
    /// Numeric item id from the world's data tables.
    pub id: u32,
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Player,
    Mob,
    /// Dropped items, projectiles, vehicles.
    Object,
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EntitySummary {
    pub id: u32,
    pub kind: EntityKind,
    /// Entity type name, e.g. `zombie`, `player`, `item`.
    pub name: String,
    #[serde(default)]
    pub username: Option<String>,
    pub position: Vec3,
    #[serde(default = "default_entity_height")]
    pub height: f64,
}

fn default_entity_height() -> f64 {
    1.6
}

impl EntitySummary {
    pub fn is_player_named(&self, username: &str) -> bool {
        self.kind == EntityKind::Player && self.username.as_deref() == Some(username)
    }

    /// Player username when present, otherwise the entity type name.
    pub fn label(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.name)
    }

    pub fn is_dropped_item(&self) -> bool {
        self.kind == EntityKind::Object && self.name == "item"
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BlockSummary {
    pub id: u32,
    pub name: String,
    pub position: BlockPos,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SelfStatus {
    pub position: Vec3,
    pub health: f32,
    pub food: u32,
    /// World tick within the day cycle.
    pub time_of_day: u64,
    pub game_mode: String,
    #[serde(default = "default_alive")]
    pub alive: bool,
}

fn default_alive() -> bool {
    true
}
