use std::sync::Arc;

use tracing::debug;

use super::{close_window, held, holdings, nearby_fixture};
use crate::agent::game_api::ContainerWindow;
use crate::agent::queries::with_note;
use crate::agent::r#loop::{AgentLoop, Recipient};
use crate::agent::session::{ContainerOp, ContainerRequest};
use crate::agent::tools::Selection;
use crate::error::{ActionError, FailedContext};

const CHESTS: [&str; 2] = ["chest", "trapped_chest"];

/// Queues a container request. Starts the drain loop when none is running.
pub fn request(agent: &Arc<AgentLoop>, op: ContainerOp, requested_by: Recipient) {
    let start = agent
        .session
        .state()
        .containers
        .enqueue(ContainerRequest { op, requested_by });
    if start {
        let agent = Arc::clone(agent);
        tokio::spawn(async move { drain(&agent).await });
    }
}

async fn drain(agent: &Arc<AgentLoop>) {
    loop {
        let next = agent.session.state().containers.next_request();
        let Some(ContainerRequest { op, requested_by }) = next else {
            break;
        };
        let outcome = match op {
            ContainerOp::View(reply) => {
                let _ = reply.send(view(agent).await);
                Ok(())
            }
            ContainerOp::Deposit(items) => deposit(agent, &requested_by, items).await,
            ContainerOp::Withdraw(items) => withdraw(agent, &requested_by, items).await,
        };
        if let Err(err) = outcome {
            agent.report(&requested_by, err.to_string()).await;
        }
    }
    debug!(agent = %agent.name, "containers.drained");
}

async fn open_nearby(agent: &AgentLoop) -> Result<ContainerWindow, ActionError> {
    let chest = nearby_fixture(agent, &CHESTS)
        .await?
        .ok_or_else(|| ActionError::resolution("No chest found nearby"))?;
    agent
        .api
        .open_container(chest.position)
        .await
        .failed(|| "Failed to open chest".to_string())
}

async fn view(agent: &AgentLoop) -> String {
    let window = match open_nearby(agent).await {
        Ok(window) => window,
        Err(ActionError::Resolution(msg)) => return msg,
        Err(_) => return "Cannot access chest".to_string(),
    };
    close_window(agent, window.id).await;
    if window.items.is_empty() {
        return "Empty chest".to_string();
    }
    let listed: Vec<String> = window
        .items
        .iter()
        .map(|i| format!("{} x{}", i.name, i.count))
        .collect();
    with_note(&listed.join(", "))
}

async fn deposit(agent: &AgentLoop, to: &Recipient, items: Selection) -> Result<(), ActionError> {
    let inventory = holdings(agent).await?;
    match &items {
        Selection::All if inventory.is_empty() => {
            return Err(ActionError::resolution("Inventory is empty"));
        }
        Selection::Item { name, amount } => {
            if held(&inventory, name).is_none_or(|(_, count)| count < *amount) {
                return Err(ActionError::resolution(format!("Don't have enough {name}")));
            }
        }
        Selection::All => {}
    }

    let window = open_nearby(agent).await?;
    let outcome = match items {
        Selection::All => {
            agent
                .report(
                    to,
                    format!("Putting entire inventory in chest ({} items)", inventory.len()),
                )
                .await;
            for item in &inventory {
                if let Err(err) = agent.api.deposit(window.id, item.id, item.count).await {
                    agent
                        .report(to, format!("Failed to put {} in chest: {err}", item.name))
                        .await;
                }
                tokio::time::sleep(agent.tuning.item_delay()).await;
            }
            Ok("Put entire inventory in chest".to_string())
        }
        Selection::Item { name, amount } => match held(&inventory, &name) {
            Some((id, _)) => agent
                .api
                .deposit(window.id, id, amount)
                .await
                .failed(|| "Failed to put item in chest".to_string())
                .map(|()| format!("Put {amount} {name} in chest")),
            None => Err(ActionError::resolution(format!("Don't have enough {name}"))),
        },
    };
    close_window(agent, window.id).await;
    agent.report(to, outcome?).await;
    Ok(())
}

async fn withdraw(agent: &AgentLoop, to: &Recipient, items: Selection) -> Result<(), ActionError> {
    let window = open_nearby(agent).await?;
    let outcome = match items {
        Selection::All if window.items.is_empty() => {
            Err(ActionError::resolution("Chest is empty"))
        }
        Selection::All => {
            agent
                .report(
                    to,
                    format!("Taking all items from chest ({} types)", window.items.len()),
                )
                .await;
            for item in &window.items {
                if let Err(err) = agent.api.withdraw(window.id, item.id, item.count).await {
                    agent
                        .report(to, format!("Failed to take {} from chest: {err}", item.name))
                        .await;
                }
                tokio::time::sleep(agent.tuning.item_delay()).await;
            }
            Ok("Took all items from chest".to_string())
        }
        Selection::Item { name, amount } => match agent.data.item_by_name(&name) {
            Some(info) => agent
                .api
                .withdraw(window.id, info.id, amount)
                .await
                .failed(|| "Failed to take item from chest".to_string())
                .map(|()| format!("Took {amount} {name} from chest")),
            None => Err(ActionError::resolution(format!("Unknown item: {name}"))),
        },
    };
    close_window(agent, window.id).await;
    agent.report(to, outcome?).await;
    Ok(())
}
