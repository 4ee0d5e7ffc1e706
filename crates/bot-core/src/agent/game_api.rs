use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::observation::{BlockPos, BlockSummary, EntitySummary, ItemStack, SelfStatus, Vec3};
use crate::error::{WorldError, WorldResult};
use crate::world::recipe::Recipe;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pathfinding target handed to the world's navigator.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Goal {
    /// Get within `range` of a point.
    Near { pos: Vec3, range: f64 },
    /// Stand adjacent to (or inside) a block.
    Block { pos: BlockPos },
    /// Reach a column, any height.
    Xz { x: f64, z: f64 },
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum BlockMatcher {
    Ids(Vec<u32>),
    Names(Vec<String>),
    NameContains(String),
}

impl BlockMatcher {
    pub fn matches(&self, block: &BlockSummary) -> bool {
        match self {
            BlockMatcher::Ids(ids) => ids.contains(&block.id),
            BlockMatcher::Names(names) => names.iter().any(|n| n == &block.name),
            BlockMatcher::NameContains(fragment) => block.name.contains(fragment.as_str()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BlockSearch {
    pub matcher: BlockMatcher,
    pub max_distance: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    Hand,
    Head,
    Torso,
    Legs,
    Feet,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FurnaceSlot {
    Input,
    Fuel,
    Output,
}

/// Face of a reference block that a new block is placed against.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Face {
    Up,
    Down,
    North,
    South,
    East,
    West,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Up,
        Face::Down,
        Face::North,
        Face::South,
        Face::East,
        Face::West,
    ];

    pub fn offset(self) -> (i32, i32, i32) {
        match self {
            Face::Up => (0, 1, 0),
            Face::Down => (0, -1, 0),
            Face::North => (0, 0, -1),
            Face::South => (0, 0, 1),
            Face::East => (1, 0, 0),
            Face::West => (-1, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ContainerWindow {
    pub id: u32,
    pub items: Vec<ItemStack>,
}

/// Event stream published by the world connection.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorldEvent {
    Login,
    Spawn,
    Chat { username: String, message: String },
    Whisper { username: String, message: String },
    GoalReached,
    PathUpdate { status: String },
    DigCompleted { position: BlockPos },
    Hurt,
    Death,
    End {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Boundary the agent uses to read and mutate the world.
///
/// Every call may fail with a `WorldError`; mutations that the world refuses come back as
/// `WorldError::Rejected` carrying the world's own cause string.
pub trait GameApi: Send + Sync {
    fn username(&self) -> &str;

    fn subscribe(&self) -> broadcast::Receiver<WorldEvent>;

    fn status<'a>(&'a self) -> BoxFuture<'a, WorldResult<SelfStatus>>;

    fn inventory<'a>(&'a self) -> BoxFuture<'a, WorldResult<Vec<ItemStack>>>;

    fn entities<'a>(&'a self) -> BoxFuture<'a, WorldResult<Vec<EntitySummary>>>;

    /// All non-air blocks inside the inclusive box.
    fn blocks_in_box<'a>(
        &'a self,
        min: BlockPos,
        max: BlockPos,
    ) -> BoxFuture<'a, WorldResult<Vec<BlockSummary>>>;

    /// Matching blocks, nearest first.
    fn find_blocks<'a>(
        &'a self,
        search: BlockSearch,
    ) -> BoxFuture<'a, WorldResult<Vec<BlockSummary>>>;

    fn set_goal<'a>(&'a self, goal: Goal) -> BoxFuture<'a, WorldResult<()>>;

    fn clear_goal<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>>;

    fn look_at<'a>(&'a self, pos: Vec3) -> BoxFuture<'a, WorldResult<()>>;

    fn dig<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<()>>;

    fn place_block<'a>(&'a self, reference: BlockPos, face: Face)
    -> BoxFuture<'a, WorldResult<()>>;

    fn activate_block<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<()>>;

    fn sleep_in<'a>(&'a self, bed: BlockPos) -> BoxFuture<'a, WorldResult<()>>;

    fn attack<'a>(&'a self, entity_id: u32) -> BoxFuture<'a, WorldResult<()>>;

    fn equip<'a>(&'a self, item_id: u32, slot: EquipSlot) -> BoxFuture<'a, WorldResult<()>>;

    /// Consume whatever is held in hand.
    fn consume<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>>;

    fn toss<'a>(&'a self, item_id: u32, count: u32) -> BoxFuture<'a, WorldResult<()>>;

    fn open_container<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<ContainerWindow>>;

    fn deposit<'a>(&'a self, window: u32, item_id: u32, count: u32)
    -> BoxFuture<'a, WorldResult<()>>;

    fn withdraw<'a>(
        &'a self,
        window: u32,
        item_id: u32,
        count: u32,
    ) -> BoxFuture<'a, WorldResult<()>>;

    fn close_container<'a>(&'a self, window: u32) -> BoxFuture<'a, WorldResult<()>>;

    fn open_furnace<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<ContainerWindow>>;

    fn furnace_put<'a>(
        &'a self,
        window: u32,
        slot: FurnaceSlot,
        item_id: u32,
        count: u32,
    ) -> BoxFuture<'a, WorldResult<()>>;

    /// Takes whatever sits in `slot`; `None` when it was empty.
    fn furnace_take<'a>(
        &'a self,
        window: u32,
        slot: FurnaceSlot,
    ) -> BoxFuture<'a, WorldResult<Option<ItemStack>>>;

    fn craft<'a>(
        &'a self,
        recipe: Recipe,
        count: u32,
        table: Option<BlockPos>,
    ) -> BoxFuture<'a, WorldResult<()>>;

    fn chat<'a>(&'a self, text: String) -> BoxFuture<'a, WorldResult<()>>;

    fn whisper<'a>(&'a self, username: String, text: String) -> BoxFuture<'a, WorldResult<()>>;

    fn quit<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>>;
}

/// Sets `goal` and waits for the navigator to report it reached.
///
/// Subscribes before issuing the goal so a fast arrival is not missed. Gives up with
/// `WorldError::Timeout` after `ceiling`; the navigator's goal is left in place.
pub async fn travel(api: &dyn GameApi, goal: Goal, ceiling: Duration) -> WorldResult<()> {
    let mut events = api.subscribe();
    api.set_goal(goal).await?;
    let wait = async {
        loop {
            match events.recv().await {
                Ok(WorldEvent::GoalReached) => return Ok(()),
                Ok(WorldEvent::End { .. }) | Err(broadcast::error::RecvError::Closed) => {
                    return Err(WorldError::Disconnected);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    };
    tokio::time::timeout(ceiling, wait)
        .await
        .unwrap_or(Err(WorldError::Timeout("goal")))
}

pub async fn find_player(api: &dyn GameApi, username: &str) -> WorldResult<Option<EntitySummary>> {
    let entities = api.entities().await?;
    Ok(entities.into_iter().find(|e| e.is_player_named(username)))
}

/// Nearest entity accepted by `filter` within `max_distance` of `from`.
pub fn nearest_entity<F>(
    entities: Vec<EntitySummary>,
    from: Vec3,
    max_distance: f64,
    filter: F,
) -> Option<EntitySummary>
where
    F: Fn(&EntitySummary) -> bool,
{
    entities
        .into_iter()
        .filter(|e| filter(e))
        .map(|e| (from.distance_to(e.position), e))
        .filter(|(d, _)| *d <= max_distance)
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, e)| e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::observation::EntityKind;

    fn mob(id: u32, name: &str, x: f64) -> EntitySummary {
        EntitySummary {
            id,
            kind: EntityKind::Mob,
            name: name.to_string(),
            username: None,
            position: Vec3::new(x, 64.0, 0.0),
            height: 1.9,
        }
    }

    #[test]
    fn nearest_entity_respects_filter_and_range() {
        let entities = vec![mob(1, "cow", 2.0), mob(2, "zombie", 5.0), mob(3, "zombie", 30.0)];
        let origin = Vec3::new(0.0, 64.0, 0.0);

        let hit = nearest_entity(entities.clone(), origin, 16.0, |e| e.name == "zombie");
        assert_eq!(hit.map(|e| e.id), Some(2));

        let none = nearest_entity(entities, origin, 4.0, |e| e.name == "zombie");
        assert!(none.is_none());
    }

    #[test]
    fn block_matcher_variants() {
        let block = BlockSummary {
            id: 17,
            name: "oak_log".to_string(),
            position: BlockPos::new(0, 0, 0),
        };
        assert!(BlockMatcher::Ids(vec![17]).matches(&block));
        assert!(BlockMatcher::Names(vec!["oak_log".to_string()]).matches(&block));
        assert!(BlockMatcher::NameContains("log".to_string()).matches(&block));
        assert!(!BlockMatcher::NameContains("bed".to_string()).matches(&block));
    }

    #[test]
    fn world_event_wire_shape() {
        let ev: WorldEvent =
            serde_json::from_str(r#"{"type":"whisper","username":"Alex","message":"hi"}"#).unwrap();
        assert_eq!(
            ev,
            WorldEvent::Whisper {
                username: "Alex".to_string(),
                message: "hi".to_string()
            }
        );
        let end: WorldEvent = serde_json::from_str(r#"{"type":"end"}"#).unwrap();
        assert_eq!(end, WorldEvent::End { reason: None });
    }
}
