//! Action dispatch. Each action command of a reply runs in its own task so a slow handler
//! never holds up the conversation; feedback flows back through `AgentLoop::report`.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::actions::{chest, combat, crafting, inventory, movement, world};
use super::prompt::HELP_TEXT;
use super::r#loop::{AgentLoop, Recipient};
use super::session::ContainerOp;
use super::tools::{Action, ParseError};
use super::wire::Command;
use crate::error::{ActionError, FailedContext};

/// One dispatched command and who asked for it.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: Command,
    pub requested_by: Recipient,
    pub issued_at: Instant,
}

/// Dispatches every action command in `commands`, skipping queries. Returns the spawned
/// tasks; unknown command names produce none.
pub fn dispatch_all(
    agent: &Arc<AgentLoop>,
    commands: &[Command],
    requested_by: &Recipient,
) -> Vec<JoinHandle<()>> {
    commands
        .iter()
        .filter(|c| !c.is_query())
        .filter_map(|c| dispatch(agent, c.clone(), requested_by.clone()))
        .collect()
}

/// Validates `command` and runs it in the background. Invalid arguments are reported to the
/// requester; an unknown name is only logged.
pub fn dispatch(
    agent: &Arc<AgentLoop>,
    command: Command,
    requested_by: Recipient,
) -> Option<JoinHandle<()>> {
    let parsed = Action::try_from(&command);
    let agent = Arc::clone(agent);
    match parsed {
        Ok(action) => {
            let invocation = Invocation {
                command,
                requested_by,
                issued_at: Instant::now(),
            };
            Some(tokio::spawn(async move {
                run(&agent, invocation, action).await;
            }))
        }
        Err(ParseError::UnknownCommand(name)) => {
            warn!(agent = %agent.name, command = %name, "dispatch.unknown_command");
            None
        }
        Err(err) => Some(tokio::spawn(async move {
            agent.report(&requested_by, err.to_string()).await;
        })),
    }
}

async fn run(agent: &Arc<AgentLoop>, invocation: Invocation, action: Action) {
    let continuous = action.is_continuous();
    info!(
        agent = %agent.name,
        user = %invocation.requested_by,
        continuous,
        "dispatch.start: {}",
        invocation.command
    );
    let result = execute(agent, &invocation, action).await;
    let elapsed_ms = invocation.issued_at.elapsed().as_millis() as u64;
    let command = &invocation.command;
    match result {
        Ok(()) if continuous => {
            debug!(agent = %agent.name, elapsed_ms, "dispatch.installed: {command}");
        }
        Ok(()) => {
            debug!(agent = %agent.name, elapsed_ms, "dispatch.done: {command}");
        }
        Err(err) => {
            debug!(agent = %agent.name, elapsed_ms, "dispatch.failed: {command}: {err}");
            agent.report(&invocation.requested_by, err.to_string()).await;
        }
    }
}

/// Runs one validated action to its first outcome. Continuous actions return once their
/// task is installed.
pub async fn execute(
    agent: &Arc<AgentLoop>,
    invocation: &Invocation,
    action: Action,
) -> Result<(), ActionError> {
    let to = &invocation.requested_by;
    match action {
        Action::Help => {
            agent.report(to, HELP_TEXT).await;
            Ok(())
        }
        Action::Stop => movement::stop(agent, to).await,
        Action::Restart => {
            agent.report(to, "Restarting...").await;
            agent
                .api
                .quit()
                .await
                .failed(|| "Failed to restart".to_string())
        }
        Action::ClearChat => {
            agent.conversation().clear();
            agent.report(to, "Conversation cleared.").await;
            Ok(())
        }

        Action::GoToPlayer { player, range } => {
            movement::go_to_player(agent, to, &player, range).await
        }
        Action::FollowPlayer { player, range } => {
            movement::follow_player(agent, to, &player, range).await
        }
        Action::GoToCoordinates { target, range } => {
            movement::go_to_coordinates(agent, to, target, range).await
        }
        Action::SearchForBlock { block, range } => {
            movement::search_for_block(agent, to, &block, range).await
        }
        Action::SearchForEntity { entity, range } => {
            movement::search_for_entity(agent, to, &entity, range).await
        }
        Action::MoveAway { distance } => movement::move_away(agent, to, distance).await,
        Action::RememberHere { place } => movement::remember_here(agent, to, &place).await,
        Action::GoToRememberedPlace { place } => {
            movement::go_to_remembered_place(agent, to, &place).await
        }
        Action::Stay { seconds } => movement::stay(agent, to, seconds).await,

        Action::GivePlayer { player, items } => {
            inventory::give_player(agent, to, &player, items).await
        }
        Action::Consume { item } => inventory::consume(agent, to, &item).await,
        Action::Equip { item } => inventory::equip(agent, to, &item).await,
        Action::Discard { items } => inventory::discard(agent, to, items).await,

        Action::PutInChest { items } => {
            chest::request(agent, ContainerOp::Deposit(items), to.clone());
            Ok(())
        }
        Action::TakeFromChest { items } => {
            chest::request(agent, ContainerOp::Withdraw(items), to.clone());
            Ok(())
        }

        Action::CraftRecipe { item, amount } => {
            crafting::craft_recipe(agent, to, &item, amount).await
        }
        Action::SmeltItem { item, amount } => crafting::smelt_item(agent, to, &item, amount).await,
        Action::ClearFurnace => crafting::clear_furnace(agent, to).await,

        Action::CollectBlocks { block, count } => {
            world::collect_blocks(agent, to, &block, count).await
        }
        Action::DigDown { count } => world::dig_down(agent, to, count).await,
        Action::PlaceHere { item } => world::place_here(agent, to, &item).await,
        Action::Activate { block } => world::activate(agent, to, &block).await,
        Action::GoToBed => world::go_to_bed(agent, to).await,
        Action::Attack { entity } => combat::attack(agent, to, &entity).await,
        Action::AttackPlayer { player } => combat::attack_player(agent, to, &player).await,
        Action::StartConversation { player, message } => {
            world::start_conversation(agent, to, &player, &message).await
        }
    }
}
