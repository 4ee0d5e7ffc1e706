//! Game data tables (items, blocks, foods, recipes) and recipe normalization.

pub mod data;
pub mod recipe;
