//! In-memory world and model doubles for unit tests.

use std::collections::{HashMap, VecDeque};
use std::future::ready;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use super::conversation::{ChatMessage, Conversation};
use super::game_api::{
    BlockSearch, BoxFuture, ContainerWindow, EquipSlot, Face, FurnaceSlot, GameApi, Goal,
    WorldEvent,
};
use super::harness::LlmClient;
use super::observation::{
    BlockPos, BlockSummary, EntityKind, EntitySummary, ItemStack, SelfStatus, Vec3,
};
use super::r#loop::AgentLoop;
use super::session::Session;
use crate::config::{BotConfig, Tuning};
use crate::error::{WorldError, WorldResult};
use crate::world::data::DataTables;
use crate::world::recipe::Recipe;

const TABLES: &str = r#"{
    "items": [
        {"id": 4, "name": "cobblestone"},
        {"id": 5, "name": "oak_planks"},
        {"id": 15, "name": "iron_ore"},
        {"id": 17, "name": "oak_log"},
        {"id": 58, "name": "crafting_table"},
        {"id": 263, "name": "coal"},
        {"id": 264, "name": "diamond"},
        {"id": 265, "name": "iron_ingot"},
        {"id": 270, "name": "wooden_pickaxe"},
        {"id": 280, "name": "stick"},
        {"id": 297, "name": "bread", "foodPoints": 5},
        {"id": 306, "name": "iron_helmet"},
        {"id": 322, "name": "golden_apple", "foodPoints": 4},
        {"id": 364, "name": "cooked_beef", "foodPoints": 8},
        {"id": 367, "name": "rotten_flesh", "foodPoints": 4}
    ],
    "blocks": [
        {"id": 1, "name": "stone"},
        {"id": 3, "name": "dirt"},
        {"id": 4, "name": "cobblestone"},
        {"id": 7, "name": "bedrock"},
        {"id": 9, "name": "water"},
        {"id": 11, "name": "lava"},
        {"id": 17, "name": "oak_log"},
        {"id": 26, "name": "red_bed"},
        {"id": 54, "name": "chest"},
        {"id": 58, "name": "crafting_table"},
        {"id": 61, "name": "furnace"}
    ],
    "recipes": {
        "5": [{"result": {"id": 5, "count": 4}, "ingredients": [17]}],
        "58": [{"result": {"id": 58, "count": 1}, "ingredients": [5, 5, 5, 5]}],
        "270": [{"result": {"id": 270, "count": 1}, "ingredients": [5, 5, 5, 280, 280], "requiresTable": true}],
        "280": [{"result": {"id": 280, "count": 4}, "ingredients": [5, 5]}]
    }
}"#;

pub fn tables() -> DataTables {
    DataTables::from_json(TABLES).expect("test tables parse")
}

pub fn player(id: u32, username: &str, position: Vec3) -> EntitySummary {
    EntitySummary {
        id,
        kind: EntityKind::Player,
        name: "player".to_string(),
        username: Some(username.to_string()),
        position,
        height: 1.8,
    }
}

pub fn mob(id: u32, name: &str, position: Vec3) -> EntitySummary {
    EntitySummary {
        id,
        kind: EntityKind::Mob,
        name: name.to_string(),
        username: None,
        position,
        height: 1.95,
    }
}

fn ready_ok<'a, T: Send + 'a>(value: WorldResult<T>) -> BoxFuture<'a, WorldResult<T>> {
    Box::pin(ready(value))
}

fn slot_name(slot: EquipSlot) -> &'static str {
    match slot {
        EquipSlot::Hand => "hand",
        EquipSlot::Head => "head",
        EquipSlot::Torso => "torso",
        EquipSlot::Legs => "legs",
        EquipSlot::Feet => "feet",
    }
}

fn furnace_slot_name(slot: FurnaceSlot) -> &'static str {
    match slot {
        FurnaceSlot::Input => "input",
        FurnaceSlot::Fuel => "fuel",
        FurnaceSlot::Output => "output",
    }
}

fn face_name(face: Face) -> &'static str {
    match face {
        Face::Up => "up",
        Face::Down => "down",
        Face::North => "north",
        Face::South => "south",
        Face::East => "east",
        Face::West => "west",
    }
}

fn take_items(items: &mut Vec<ItemStack>, id: u32, count: u32) -> Option<ItemStack> {
    let held: u32 = items.iter().filter(|i| i.id == id).map(|i| i.count).sum();
    if held < count || count == 0 {
        return None;
    }
    let name = items.iter().find(|i| i.id == id)?.name.clone();
    let mut left = count;
    for item in items.iter_mut().filter(|i| i.id == id) {
        let taken = item.count.min(left);
        item.count -= taken;
        left -= taken;
    }
    items.retain(|i| i.count > 0);
    Some(ItemStack { id, name, count })
}

fn put_items(items: &mut Vec<ItemStack>, stack: ItemStack) {
    match items.iter_mut().find(|i| i.id == stack.id) {
        Some(existing) => existing.count += stack.count,
        None => items.push(stack),
    }
}

struct WorldInner {
    status: SelfStatus,
    inventory: Vec<ItemStack>,
    entities: Vec<EntitySummary>,
    blocks: Vec<BlockSummary>,
    chests: HashMap<BlockPos, Vec<ItemStack>>,
    windows: HashMap<u32, BlockPos>,
    next_window: u32,
    auto_arrive: bool,
    rejections: Vec<(String, String)>,
    calls: Vec<String>,
    chats: Vec<String>,
    whispers: Vec<(String, String)>,
    looked_at: Vec<Vec3>,
}

/// Scriptable world. Every mutating call is recorded in `calls()`; chat goes to `chats()` and
/// `whispers_to()`. With auto-arrive on (the default) a goal teleports the agent and reports
/// it reached.
pub struct FakeWorld {
    name: String,
    events: broadcast::Sender<WorldEvent>,
    inner: Mutex<WorldInner>,
}

impl FakeWorld {
    pub fn new(name: &str) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            name: name.to_string(),
            events,
            inner: Mutex::new(WorldInner {
                status: SelfStatus {
                    position: Vec3::new(0.0, 64.0, 0.0),
                    health: 20.0,
                    food: 20,
                    time_of_day: 6000,
                    game_mode: "survival".to_string(),
                    alive: true,
                },
                inventory: Vec::new(),
                entities: Vec::new(),
                blocks: Vec::new(),
                chests: HashMap::new(),
                windows: HashMap::new(),
                next_window: 1,
                auto_arrive: true,
                rejections: Vec::new(),
                calls: Vec::new(),
                chats: Vec::new(),
                whispers: Vec::new(),
                looked_at: Vec::new(),
            }),
        })
    }

    fn inner(&self) -> MutexGuard<'_, WorldInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_position(&self, pos: Vec3) {
        self.inner().status.position = pos;
    }

    pub fn set_health(&self, health: f32) {
        self.inner().status.health = health;
    }

    pub fn set_food(&self, food: u32) {
        self.inner().status.food = food;
    }

    pub fn set_inventory(&self, items: Vec<ItemStack>) {
        self.inner().inventory = items;
    }

    pub fn set_entities(&self, entities: Vec<EntitySummary>) {
        self.inner().entities = entities;
    }

    pub fn set_blocks(&self, blocks: Vec<BlockSummary>) {
        self.inner().blocks = blocks;
    }

    pub fn add_chest(&self, pos: BlockPos, items: Vec<ItemStack>) {
        let mut inner = self.inner();
        inner.blocks.push(BlockSummary {
            id: 54,
            name: "chest".to_string(),
            position: pos,
        });
        inner.chests.insert(pos, items);
    }

    pub fn set_auto_arrive(&self, on: bool) {
        self.inner().auto_arrive = on;
    }

    /// Calls whose recorded form starts with `prefix` fail with `cause`.
    pub fn reject(&self, prefix: &str, cause: &str) {
        self.inner()
            .rejections
            .push((prefix.to_string(), cause.to_string()));
    }

    pub fn emit(&self, event: WorldEvent) {
        let _ = self.events.send(event);
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut self.inner().calls)
    }

    pub fn chats(&self) -> Vec<String> {
        self.inner().chats.clone()
    }

    pub fn whispers_to(&self, username: &str) -> Vec<String> {
        self.inner()
            .whispers
            .iter()
            .filter(|(to, _)| to == username)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn looked_at(&self) -> Vec<Vec3> {
        self.inner().looked_at.clone()
    }

    /// Records `call` and applies `effect` unless a rejection matches it.
    fn mutate<T>(
        &self,
        call: String,
        effect: impl FnOnce(&mut WorldInner) -> WorldResult<T>,
    ) -> WorldResult<T> {
        let mut inner = self.inner();
        let rejected = inner
            .rejections
            .iter()
            .find(|(prefix, _)| call.starts_with(prefix.as_str()))
            .map(|(_, cause)| cause.clone());
        inner.calls.push(call);
        match rejected {
            Some(cause) => Err(WorldError::Rejected(cause)),
            None => effect(&mut *inner),
        }
    }

    fn window_chest(inner: &WorldInner, window: u32) -> WorldResult<BlockPos> {
        inner
            .windows
            .get(&window)
            .copied()
            .ok_or_else(|| WorldError::Rejected("window is not open".to_string()))
    }
}

impl GameApi for FakeWorld {
    fn username(&self) -> &str {
        &self.name
    }

    fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.events.subscribe()
    }

    fn status<'a>(&'a self) -> BoxFuture<'a, WorldResult<SelfStatus>> {
        ready_ok(Ok(self.inner().status.clone()))
    }

    fn inventory<'a>(&'a self) -> BoxFuture<'a, WorldResult<Vec<ItemStack>>> {
        ready_ok(Ok(self.inner().inventory.clone()))
    }

    fn entities<'a>(&'a self) -> BoxFuture<'a, WorldResult<Vec<EntitySummary>>> {
        ready_ok(Ok(self.inner().entities.clone()))
    }

    fn blocks_in_box<'a>(
        &'a self,
        min: BlockPos,
        max: BlockPos,
    ) -> BoxFuture<'a, WorldResult<Vec<BlockSummary>>> {
        let blocks = self
            .inner()
            .blocks
            .iter()
            .filter(|b| {
                let p = b.position;
                (min.x..=max.x).contains(&p.x)
                    && (min.y..=max.y).contains(&p.y)
                    && (min.z..=max.z).contains(&p.z)
            })
            .cloned()
            .collect();
        ready_ok(Ok(blocks))
    }

    fn find_blocks<'a>(
        &'a self,
        search: BlockSearch,
    ) -> BoxFuture<'a, WorldResult<Vec<BlockSummary>>> {
        let inner = self.inner();
        let here = inner.status.position;
        let mut found: Vec<(f64, BlockSummary)> = inner
            .blocks
            .iter()
            .filter(|b| search.matcher.matches(b))
            .map(|b| (here.distance_to(b.position.center()), b.clone()))
            .filter(|(d, _)| *d <= search.max_distance)
            .collect();
        found.sort_by(|a, b| a.0.total_cmp(&b.0));
        let blocks = found
            .into_iter()
            .take(search.count)
            .map(|(_, b)| b)
            .collect();
        ready_ok(Ok(blocks))
    }

    fn set_goal<'a>(&'a self, goal: Goal) -> BoxFuture<'a, WorldResult<()>> {
        let call = match &goal {
            Goal::Near { pos, range } => {
                format!("set_goal near {:.1},{:.1},{:.1} r{range}", pos.x, pos.y, pos.z)
            }
            Goal::Block { pos } => format!("set_goal block {pos}"),
            Goal::Xz { x, z } => format!("set_goal xz {x:.1},{z:.1}"),
        };
        let arrived = self.mutate(call, |inner| {
            if !inner.auto_arrive {
                return Ok(false);
            }
            let here = inner.status.position;
            inner.status.position = match goal {
                Goal::Near { pos, .. } => pos,
                Goal::Block { pos } => Vec3::new(
                    f64::from(pos.x) + 0.5,
                    f64::from(pos.y),
                    f64::from(pos.z) + 0.5,
                ),
                Goal::Xz { x, z } => Vec3::new(x, here.y, z),
            };
            Ok(true)
        });
        if let Ok(true) = arrived {
            self.emit(WorldEvent::GoalReached);
        }
        ready_ok(arrived.map(|_| ()))
    }

    fn clear_goal<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate("clear_goal".to_string(), |_| Ok(())))
    }

    fn look_at<'a>(&'a self, pos: Vec3) -> BoxFuture<'a, WorldResult<()>> {
        self.inner().looked_at.push(pos);
        ready_ok(Ok(()))
    }

    fn dig<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<()>> {
        let dug = self.mutate(format!("dig {pos}"), |inner| {
            let before = inner.blocks.len();
            inner.blocks.retain(|b| b.position != pos);
            if inner.blocks.len() == before {
                return Err(WorldError::Rejected("nothing to dig".to_string()));
            }
            Ok(())
        });
        if dug.is_ok() {
            self.emit(WorldEvent::DigCompleted { position: pos });
        }
        ready_ok(dug)
    }

    fn place_block<'a>(
        &'a self,
        reference: BlockPos,
        face: Face,
    ) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(
            format!("place_block {reference} {}", face_name(face)),
            |_| Ok(()),
        ))
    }

    fn activate_block<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(format!("activate_block {pos}"), |_| Ok(())))
    }

    fn sleep_in<'a>(&'a self, bed: BlockPos) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(format!("sleep_in {bed}"), |_| Ok(())))
    }

    fn attack<'a>(&'a self, entity_id: u32) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(format!("attack {entity_id}"), |_| Ok(())))
    }

    fn equip<'a>(&'a self, item_id: u32, slot: EquipSlot) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(format!("equip {item_id} {}", slot_name(slot)), |_| Ok(())))
    }

    fn consume<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate("consume".to_string(), |_| Ok(())))
    }

    fn toss<'a>(&'a self, item_id: u32, count: u32) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(format!("toss {item_id} {count}"), |inner| {
            take_items(&mut inner.inventory, item_id, count)
                .map(|_| ())
                .ok_or_else(|| WorldError::Rejected("not enough items".to_string()))
        }))
    }

    fn open_container<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<ContainerWindow>> {
        ready_ok(self.mutate(format!("open_container {pos}"), |inner| {
            let items = inner
                .chests
                .get(&pos)
                .cloned()
                .ok_or_else(|| WorldError::Rejected("no container there".to_string()))?;
            let id = inner.next_window;
            inner.next_window += 1;
            inner.windows.insert(id, pos);
            Ok(ContainerWindow { id, items })
        }))
    }

    fn deposit<'a>(
        &'a self,
        window: u32,
        item_id: u32,
        count: u32,
    ) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(format!("deposit {item_id} {count}"), |inner| {
            let chest = Self::window_chest(inner, window)?;
            let stack = take_items(&mut inner.inventory, item_id, count)
                .ok_or_else(|| WorldError::Rejected("not enough items".to_string()))?;
            put_items(inner.chests.entry(chest).or_default(), stack);
            Ok(())
        }))
    }

    fn withdraw<'a>(
        &'a self,
        window: u32,
        item_id: u32,
        count: u32,
    ) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(format!("withdraw {item_id} {count}"), |inner| {
            let chest = Self::window_chest(inner, window)?;
            let contents = inner.chests.entry(chest).or_default();
            let stack = take_items(contents, item_id, count)
                .ok_or_else(|| WorldError::Rejected("not enough items in chest".to_string()))?;
            put_items(&mut inner.inventory, stack);
            Ok(())
        }))
    }

    fn close_container<'a>(&'a self, window: u32) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate(format!("close_container {window}"), |inner| {
            inner.windows.remove(&window);
            Ok(())
        }))
    }

    fn open_furnace<'a>(&'a self, pos: BlockPos) -> BoxFuture<'a, WorldResult<ContainerWindow>> {
        ready_ok(self.mutate(format!("open_furnace {pos}"), |inner| {
            let id = inner.next_window;
            inner.next_window += 1;
            inner.windows.insert(id, pos);
            Ok(ContainerWindow { id, items: Vec::new() })
        }))
    }

    fn furnace_put<'a>(
        &'a self,
        window: u32,
        slot: FurnaceSlot,
        item_id: u32,
        count: u32,
    ) -> BoxFuture<'a, WorldResult<()>> {
        let call = format!("furnace_put {window} {} {item_id} {count}", furnace_slot_name(slot));
        ready_ok(self.mutate(call, |inner| {
            take_items(&mut inner.inventory, item_id, count)
                .map(|_| ())
                .ok_or_else(|| WorldError::Rejected("not enough items".to_string()))
        }))
    }

    fn furnace_take<'a>(
        &'a self,
        window: u32,
        slot: FurnaceSlot,
    ) -> BoxFuture<'a, WorldResult<Option<ItemStack>>> {
        let call = format!("furnace_take {window} {}", furnace_slot_name(slot));
        ready_ok(self.mutate(call, |_| Ok(None)))
    }

    fn craft<'a>(
        &'a self,
        recipe: Recipe,
        count: u32,
        table: Option<BlockPos>,
    ) -> BoxFuture<'a, WorldResult<()>> {
        let table = table.map_or_else(|| "none".to_string(), |t| t.to_string());
        ready_ok(self.mutate(
            format!("craft {} x{count} table {table}", recipe.result_id),
            |_| Ok(()),
        ))
    }

    fn chat<'a>(&'a self, text: String) -> BoxFuture<'a, WorldResult<()>> {
        self.inner().chats.push(text);
        ready_ok(Ok(()))
    }

    fn whisper<'a>(&'a self, username: String, text: String) -> BoxFuture<'a, WorldResult<()>> {
        self.inner().whispers.push((username, text));
        ready_ok(Ok(()))
    }

    fn quit<'a>(&'a self) -> BoxFuture<'a, WorldResult<()>> {
        ready_ok(self.mutate("quit".to_string(), |_| Ok(())))
    }
}

/// Model double answering from a script, in order. An exhausted script fails the call.
pub struct FakeLlm {
    replies: Mutex<VecDeque<anyhow::Result<String>>>,
    calls: AtomicUsize,
}

impl FakeLlm {
    pub fn new<S: Into<String>>(replies: Vec<S>) -> Arc<Self> {
        Self::scripted(replies.into_iter().map(|r| Ok(r.into())).collect())
    }

    pub fn scripted(replies: Vec<anyhow::Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmClient for FakeLlm {
    fn complete<'a>(
        &'a self,
        _messages: Vec<ChatMessage>,
    ) -> BoxFuture<'a, anyhow::Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")));
        Box::pin(ready(reply))
    }
}

/// Agent named after `world` with default tuning and a fresh session.
pub fn agent_with(
    world: Arc<FakeWorld>,
    llm: Arc<FakeLlm>,
    configure: impl FnOnce(&mut BotConfig),
) -> Arc<AgentLoop> {
    let mut config = BotConfig {
        username: world.username().to_string(),
        ..BotConfig::default()
    };
    configure(&mut config);
    AgentLoop::new(
        config,
        Tuning::default(),
        world,
        Arc::new(tables()),
        llm,
        Arc::new(Session::default()),
        Arc::new(Mutex::new(Conversation::new("You are Andy, a helpful player."))),
    )
}
