use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// One `{id, count}` reference as the data tables spell it. Older tables use `type` for the id.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RawItemCount {
    #[serde(alias = "type")]
    pub id: u32,
    #[serde(default = "one")]
    pub count: u32,
}

fn one() -> u32 {
    1
}

/// Ingredient entries come in several shapes depending on the table version.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawIngredient {
    Id(u32),
    Item(RawItemCount),
    /// Any one of the alternatives satisfies the slot.
    Choice(Vec<RawItemCount>),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RawRecipe {
    pub result: RawItemCount,
    #[serde(default)]
    pub ingredients: Vec<RawIngredient>,
    /// Named requirement map, keyed by an arbitrary label.
    #[serde(default)]
    pub requires: BTreeMap<String, RawItemCount>,
    #[serde(default, alias = "requiresWorkbench")]
    pub requires_table: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct Ingredient {
    pub id: u32,
    pub count: u32,
}

/// Recipe reduced to a flat `{id -> count}` requirement list.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Recipe {
    pub result_id: u32,
    pub result_count: u32,
    pub requires_table: bool,
    pub ingredients: Vec<Ingredient>,
    /// Original table entry, handed back to the world when crafting.
    pub raw: RawRecipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shortfall {
    pub id: u32,
    pub need: u32,
    pub have: u32,
}

impl Recipe {
    /// Flattens every ingredient shape into per-id totals. Choice lists count as their first
    /// alternative; the `requires` map is only consulted when no ingredient list is present.
    pub fn normalize(raw: &RawRecipe) -> Self {
        let mut totals: BTreeMap<u32, u32> = BTreeMap::new();
        for ingredient in &raw.ingredients {
            let picked = match ingredient {
                RawIngredient::Id(id) => Some((*id, 1)),
                RawIngredient::Item(item) => Some((item.id, item.count)),
                RawIngredient::Choice(options) => options.first().map(|o| (o.id, o.count)),
            };
            if let Some((id, count)) = picked {
                *totals.entry(id).or_default() += count.max(1);
            }
        }
        if raw.ingredients.is_empty() {
            for item in raw.requires.values() {
                *totals.entry(item.id).or_default() += item.count.max(1);
            }
        }

        Self {
            result_id: raw.result.id,
            result_count: raw.result.count.max(1),
            requires_table: raw.requires_table,
            ingredients: totals
                .into_iter()
                .map(|(id, count)| Ingredient { id, count })
                .collect(),
            raw: raw.clone(),
        }
    }

    /// How many times the recipe can run with `held` (item id -> count). `None` when the
    /// recipe has no ingredients at all.
    pub fn max_crafts(&self, held: &HashMap<u32, u32>) -> Option<u32> {
        self.ingredients
            .iter()
            .map(|ing| held.get(&ing.id).copied().unwrap_or(0) / ing.count)
            .min()
    }

    /// Ingredients that do not cover a single craft.
    pub fn shortfalls(&self, held: &HashMap<u32, u32>) -> Vec<Shortfall> {
        self.ingredients
            .iter()
            .filter_map(|ing| {
                let have = held.get(&ing.id).copied().unwrap_or(0);
                (have < ing.count).then_some(Shortfall {
                    id: ing.id,
                    need: ing.count,
                    have,
                })
            })
            .collect()
    }
}
