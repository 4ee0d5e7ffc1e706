//! Action handlers. Each resolves its arguments against live world state, moves when it
//! needs proximity, performs the mutation and reports the outcome to the requester.
//! Handlers return `Err(ActionError)` for terminal failures; the dispatcher reports those.

pub mod chest;
pub mod combat;
pub mod crafting;
pub mod inventory;
pub mod movement;
pub mod world;

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use super::game_api::{BlockMatcher, BlockSearch, Goal, find_player, travel};
use super::observation::{BlockPos, BlockSummary, EntitySummary, ItemStack, SelfStatus};
use super::r#loop::{AgentLoop, Recipient};
use super::session::Concern;
use crate::error::{ActionError, FailedContext};

pub(crate) async fn me(agent: &AgentLoop) -> Result<SelfStatus, ActionError> {
    agent
        .api
        .status()
        .await
        .failed(|| "I can't tell where I am".to_string())
}

pub(crate) async fn holdings(agent: &AgentLoop) -> Result<Vec<ItemStack>, ActionError> {
    agent
        .api
        .inventory()
        .await
        .failed(|| "I can't check my inventory".to_string())
}

/// Total held count of `name` across stacks, with the item id.
pub(crate) fn held(items: &[ItemStack], name: &str) -> Option<(u32, u32)> {
    let mut found = None;
    for item in items.iter().filter(|i| i.name == name) {
        let (_, count) = found.get_or_insert((item.id, 0));
        *count += item.count;
    }
    found
}

pub(crate) async fn locate_player(
    agent: &AgentLoop,
    username: &str,
) -> Result<EntitySummary, ActionError> {
    find_player(agent.api.as_ref(), username)
        .await
        .failed(|| format!("I can't look for {username}"))?
        .ok_or_else(|| ActionError::resolution(format!("Player {username} not found.")))
}

/// Nearest block accepted by `matcher` within `radius`.
pub(crate) async fn nearest_block(
    agent: &AgentLoop,
    matcher: BlockMatcher,
    radius: f64,
) -> Result<Option<BlockSummary>, ActionError> {
    let found = agent
        .api
        .find_blocks(BlockSearch {
            matcher,
            max_distance: radius,
            count: 1,
        })
        .await
        .failed(|| "I can't search around me".to_string())?;
    Ok(found.into_iter().next())
}

/// Crafting table, chest or furnace within the fixture radius.
pub(crate) async fn nearby_fixture(
    agent: &AgentLoop,
    names: &[&str],
) -> Result<Option<BlockSummary>, ActionError> {
    let matcher = BlockMatcher::Names(names.iter().map(|n| n.to_string()).collect());
    nearest_block(agent, matcher, agent.tuning.fixture_radius).await
}

pub(crate) async fn block_at(
    agent: &AgentLoop,
    pos: BlockPos,
) -> Result<Option<BlockSummary>, ActionError> {
    let blocks = agent
        .api
        .blocks_in_box(pos, pos)
        .await
        .failed(|| "I can't see the blocks around me".to_string())?;
    Ok(blocks.into_iter().next())
}

/// Walks to `goal` and waits for arrival within the goal ceiling.
pub(crate) async fn go(agent: &AgentLoop, goal: Goal) -> Result<(), ActionError> {
    travel(agent.api.as_ref(), goal, agent.tuning.goal_wait())
        .await
        .failed(|| "I couldn't get there".to_string())
}

pub(crate) async fn close_window(agent: &AgentLoop, window: u32) {
    if let Err(err) = agent.api.close_container(window).await {
        warn!(agent = %agent.name, window, "container.close_failed: {err}");
    }
}

/// Runs `work` as the agent's task for `concern`, replacing (and aborting) any previous one.
/// A terminal error is reported to `to`.
pub(crate) fn spawn_continuous<F>(agent: &Arc<AgentLoop>, concern: Concern, to: Recipient, work: F)
where
    F: Future<Output = Result<(), ActionError>> + Send + 'static,
{
    let reporter = Arc::clone(agent);
    let handle = tokio::spawn(async move {
        if let Err(err) = work.await {
            reporter.report(&to, err.to_string()).await;
        }
    });
    agent.session.state().replace_task(concern, handle);
}
