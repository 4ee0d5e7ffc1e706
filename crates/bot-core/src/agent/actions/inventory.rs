use super::{go, held, holdings, locate_player};
use crate::agent::game_api::{EquipSlot, Goal};
use crate::agent::r#loop::{AgentLoop, Recipient};
use crate::agent::tools::Selection;
use crate::error::{ActionError, FailedContext};

pub fn slot_for(item: &str) -> EquipSlot {
    if item.ends_with("_helmet") || item.ends_with("_head") || item == "turtle_helmet" {
        EquipSlot::Head
    } else if item.ends_with("_chestplate") || item == "elytra" {
        EquipSlot::Torso
    } else if item.ends_with("_leggings") {
        EquipSlot::Legs
    } else if item.ends_with("_boots") {
        EquipSlot::Feet
    } else {
        EquipSlot::Hand
    }
}

pub async fn give_player(
    agent: &AgentLoop,
    to: &Recipient,
    player: &str,
    items: Selection,
) -> Result<(), ActionError> {
    let target = locate_player(agent, player).await?;
    let inventory = holdings(agent).await?;

    match items {
        Selection::All => {
            if inventory.is_empty() {
                return Err(ActionError::resolution("Inventory is empty"));
            }
            agent
                .report(
                    to,
                    format!("Giving entire inventory to {player} ({} items)", inventory.len()),
                )
                .await;
            go(agent, Goal::Near { pos: target.position, range: 2.0 }).await?;
            let _ = agent.api.look_at(target.position.offset(0.0, target.height, 0.0)).await;
            for item in &inventory {
                if let Err(err) = agent.api.toss(item.id, item.count).await {
                    agent
                        .report(to, format!("Failed to give {}: {err}", item.name))
                        .await;
                }
                tokio::time::sleep(agent.tuning.item_delay()).await;
            }
            agent.report(to, format!("Gave everything to {player}")).await;
        }
        Selection::Item { name, amount } => {
            let (id, have) = held(&inventory, &name).unwrap_or((0, 0));
            if have < amount {
                return Err(ActionError::resolution(format!(
                    "Don't have enough {name} (need {amount}, have {have})"
                )));
            }
            agent
                .report(to, format!("Giving {amount} {name} to {player}"))
                .await;
            go(agent, Goal::Near { pos: target.position, range: 2.0 }).await?;
            let _ = agent.api.look_at(target.position.offset(0.0, target.height, 0.0)).await;
            agent
                .api
                .toss(id, amount)
                .await
                .failed(|| "Failed to give item".to_string())?;
            agent.report(to, format!("Tossed {amount} {name}")).await;
        }
    }
    Ok(())
}

pub async fn consume(agent: &AgentLoop, to: &Recipient, item: &str) -> Result<(), ActionError> {
    let inventory = holdings(agent).await?;
    let Some((id, _)) = held(&inventory, item) else {
        return Err(ActionError::resolution(format!("Don't have {item} to consume")));
    };
    agent.report(to, format!("Consuming: {item}")).await;
    agent
        .api
        .equip(id, EquipSlot::Hand)
        .await
        .failed(|| format!("Failed to consume {item}"))?;
    agent
        .api
        .consume()
        .await
        .failed(|| format!("Failed to consume {item}"))
}

pub async fn equip(agent: &AgentLoop, to: &Recipient, item: &str) -> Result<(), ActionError> {
    let inventory = holdings(agent).await?;
    let Some((id, _)) = held(&inventory, item) else {
        return Err(ActionError::resolution(format!("Don't have {item} to equip")));
    };
    agent.report(to, format!("Equipping: {item}")).await;
    agent
        .api
        .equip(id, slot_for(item))
        .await
        .failed(|| format!("Failed to equip {item}"))
}

/// Batch discards iterate the holdings snapshot; one failed toss does not stop the rest.
pub async fn discard(
    agent: &AgentLoop,
    to: &Recipient,
    items: Selection,
) -> Result<(), ActionError> {
    let inventory = holdings(agent).await?;
    match items {
        Selection::All => {
            if inventory.is_empty() {
                return Err(ActionError::resolution("Inventory is empty"));
            }
            agent
                .report(
                    to,
                    format!("Discarding entire inventory ({} items)", inventory.len()),
                )
                .await;
            for item in &inventory {
                if let Err(err) = agent.api.toss(item.id, item.count).await {
                    agent
                        .report(to, format!("Failed to discard {}: {err}", item.name))
                        .await;
                }
                tokio::time::sleep(agent.tuning.item_delay()).await;
            }
        }
        Selection::Item { name, amount } => {
            let (id, have) = held(&inventory, &name).unwrap_or((0, 0));
            if have < amount {
                return Err(ActionError::resolution(format!(
                    "Don't have enough {name} to discard"
                )));
            }
            agent.report(to, format!("Discarding {amount} {name}")).await;
            agent
                .api
                .toss(id, amount)
                .await
                .failed(|| format!("Failed to discard {name}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::observation::{ItemStack, Vec3};
    use crate::agent::testkit::{FakeLlm, FakeWorld, agent_with, player};

    fn stack(id: u32, name: &str, count: u32) -> ItemStack {
        ItemStack {
            id,
            name: name.to_string(),
            count,
        }
    }

    fn alex() -> Recipient {
        Recipient::Player("Alex".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn discard_all_on_empty_inventory_tosses_nothing() {
        let world = FakeWorld::new("Andy");
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        let err = discard(&agent, &alex(), Selection::All).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
        assert!(world.calls().iter().all(|c| !c.starts_with("toss")));
    }

    #[tokio::test(start_paused = true)]
    async fn discard_all_tosses_each_stack_once_and_continues_after_failure() {
        let world = FakeWorld::new("Andy");
        world.set_inventory(vec![
            stack(297, "bread", 3),
            stack(4, "cobblestone", 64),
            stack(280, "stick", 2),
        ]);
        world.reject("toss 4", "cannot drop here");
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        discard(&agent, &alex(), Selection::All).await.unwrap();

        let tosses: Vec<String> = world
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("toss"))
            .collect();
        assert_eq!(tosses, vec!["toss 297 3", "toss 4 64", "toss 280 2"]);
        assert!(
            world
                .whispers_to("Alex")
                .iter()
                .any(|m| m == "Failed to discard cobblestone: cannot drop here")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn give_walks_to_player_then_tosses() {
        let world = FakeWorld::new("Andy");
        world.set_inventory(vec![stack(297, "bread", 5)]);
        world.set_entities(vec![player(2, "Alex", Vec3::new(10.0, 64.0, 0.0))]);
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        give_player(
            &agent,
            &alex(),
            "Alex",
            Selection::Item { name: "bread".to_string(), amount: 2 },
        )
        .await
        .unwrap();

        let calls = world.calls();
        let goal = calls.iter().position(|c| c.starts_with("set_goal near")).unwrap();
        let toss = calls.iter().position(|c| c == "toss 297 2").unwrap();
        assert!(goal < toss);
    }

    #[tokio::test]
    async fn insufficient_amount_reports_need_and_have() {
        let world = FakeWorld::new("Andy");
        world.set_inventory(vec![stack(297, "bread", 1)]);
        world.set_entities(vec![player(2, "Alex", Vec3::new(1.0, 64.0, 0.0))]);
        let agent = agent_with(world, FakeLlm::new(Vec::<&str>::new()), |_| {});

        let err = give_player(
            &agent,
            &alex(),
            "Alex",
            Selection::Item { name: "bread".to_string(), amount: 4 },
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Don't have enough bread (need 4, have 1)");
    }

    #[tokio::test]
    async fn equip_rejection_carries_cause() {
        let world = FakeWorld::new("Andy");
        world.set_inventory(vec![stack(306, "iron_helmet", 1)]);
        world.reject("equip", "slot locked");
        let agent = agent_with(world.clone(), FakeLlm::new(Vec::<&str>::new()), |_| {});

        let err = equip(&agent, &alex(), "iron_helmet").await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to equip iron_helmet: slot locked");
    }

    #[test]
    fn armor_slots_from_names() {
        assert_eq!(slot_for("diamond_helmet"), EquipSlot::Head);
        assert_eq!(slot_for("iron_chestplate"), EquipSlot::Torso);
        assert_eq!(slot_for("golden_leggings"), EquipSlot::Legs);
        assert_eq!(slot_for("leather_boots"), EquipSlot::Feet);
        assert_eq!(slot_for("iron_sword"), EquipSlot::Hand);
    }
}
