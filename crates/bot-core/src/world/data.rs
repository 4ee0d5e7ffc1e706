use std::collections::HashMap;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::recipe::RawRecipe;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemInfo {
    pub id: u32,
    pub name: String,
    /// Hunger restored when eaten; absent for non-food items.
    #[serde(default)]
    pub food_points: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BlockInfo {
    pub id: u32,
    pub name: String,
}

/// Read-only lookup into the world's game data.
pub trait WorldData: Send + Sync {
    fn item_by_name(&self, name: &str) -> Option<ItemInfo>;

    fn item_by_id(&self, id: u32) -> Option<ItemInfo>;

    fn block_by_name(&self, name: &str) -> Option<BlockInfo>;

    /// Raw recipes producing `item_id`, in table order.
    fn recipes_for(&self, item_id: u32) -> Vec<RawRecipe>;

    fn food_points(&self, item_name: &str) -> Option<f32> {
        self.item_by_name(item_name).and_then(|i| i.food_points)
    }

    fn item_name(&self, id: u32) -> String {
        self.item_by_id(id)
            .map(|i| i.name)
            .unwrap_or_else(|| format!("item#{id}"))
    }
}

#[derive(Debug, Default, Deserialize)]
struct TablesFile {
    #[serde(default)]
    items: Vec<ItemInfo>,
    #[serde(default)]
    blocks: Vec<BlockInfo>,
    #[serde(default)]
    recipes: HashMap<u32, Vec<RawRecipe>>,
}

/// In-memory data tables, indexed by id and name.
#[derive(Debug, Default, Clone)]
pub struct DataTables {
    items: HashMap<u32, ItemInfo>,
    item_ids: HashMap<String, u32>,
    blocks: HashMap<String, BlockInfo>,
    recipes: HashMap<u32, Vec<RawRecipe>>,
}

impl DataTables {
    pub fn new(
        items: Vec<ItemInfo>,
        blocks: Vec<BlockInfo>,
        recipes: HashMap<u32, Vec<RawRecipe>>,
    ) -> Self {
        let item_ids = items.iter().map(|i| (i.name.clone(), i.id)).collect();
        Self {
            items: items.into_iter().map(|i| (i.id, i)).collect(),
            item_ids,
            blocks: blocks.into_iter().map(|b| (b.name.clone(), b)).collect(),
            recipes,
        }
    }

    /// Parses the `{items, blocks, recipes}` document served by the world bridge.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let file: TablesFile = serde_json::from_str(json).context("parse data tables")?;
        Ok(Self::new(file.items, file.blocks, file.recipes))
    }

    pub fn from_value(value: serde_json::Value) -> anyhow::Result<Self> {
        let file: TablesFile = serde_json::from_value(value).context("parse data tables")?;
        Ok(Self::new(file.items, file.blocks, file.recipes))
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

impl WorldData for DataTables {
    fn item_by_name(&self, name: &str) -> Option<ItemInfo> {
        self.item_ids
            .get(name)
            .and_then(|id| self.items.get(id))
            .cloned()
    }

    fn item_by_id(&self, id: u32) -> Option<ItemInfo> {
        self.items.get(&id).cloned()
    }

    fn block_by_name(&self, name: &str) -> Option<BlockInfo> {
        self.blocks.get(name).cloned()
    }

    fn recipes_for(&self, item_id: u32) -> Vec<RawRecipe> {
        self.recipes.get(&item_id).cloned().unwrap_or_default()
    }
}
