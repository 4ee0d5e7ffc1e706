use std::sync::Arc;

use tracing::{debug, info};

use crate::agent::actions::{holdings, me};
use crate::agent::game_api::EquipSlot;
use crate::agent::observation::ItemStack;
use crate::agent::r#loop::AgentLoop;
use crate::error::{ActionError, FailedContext};

/// Eaten first when health is low, best first.
pub const EMERGENCY_FOODS: [&str; 2] = ["enchanted_golden_apple", "golden_apple"];

/// Never eaten automatically.
pub const OBJECTIONABLE_FOODS: [&str; 7] = [
    "rotten_flesh",
    "spider_eye",
    "poisonous_potato",
    "pufferfish",
    "chicken",
    "suspicious_stew",
    "chorus_fruit",
];

pub const DISTRESS_MESSAGE: &str = "I'm badly hurt and need help!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EatOutcome {
    /// Another check is already eating.
    Busy,
    Satisfied,
    Ate(String),
    NothingToEat,
}

struct EatingGuard<'a> {
    agent: &'a AgentLoop,
}

impl<'a> EatingGuard<'a> {
    fn acquire(agent: &'a AgentLoop) -> Option<Self> {
        let mut state = agent.session.state();
        if state.eating {
            return None;
        }
        state.eating = true;
        Some(Self { agent })
    }
}

impl Drop for EatingGuard<'_> {
    fn drop(&mut self) {
        self.agent.session.state().eating = false;
    }
}

/// Highest-nutrition food held that is neither objectionable nor reserved for emergencies.
fn best_food<'a>(agent: &AgentLoop, items: &'a [ItemStack]) -> Option<&'a ItemStack> {
    items
        .iter()
        .filter(|i| !OBJECTIONABLE_FOODS.contains(&i.name.as_str()))
        .filter(|i| !EMERGENCY_FOODS.contains(&i.name.as_str()))
        .filter_map(|i| agent.data.food_points(&i.name).map(|points| (points, i)))
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, item)| item)
}

async fn eat(agent: &AgentLoop, item: &ItemStack) -> Result<(), ActionError> {
    agent
        .api
        .equip(item.id, EquipSlot::Hand)
        .await
        .failed(|| format!("Failed to equip {}", item.name))?;
    agent
        .api
        .consume()
        .await
        .failed(|| format!("Failed to consume {}", item.name))
}

/// One auto-eat check: heal from an emergency food when badly hurt, otherwise eat the best
/// regular food when hungry.
pub async fn check_once(agent: &AgentLoop) -> Result<EatOutcome, ActionError> {
    let Some(_guard) = EatingGuard::acquire(agent) else {
        return Ok(EatOutcome::Busy);
    };
    let status = me(agent).await?;
    if !status.alive {
        return Ok(EatOutcome::Satisfied);
    }

    let tuning = &agent.tuning;
    let announce = {
        let mut state = agent.session.state();
        if status.health >= tuning.emergency_health {
            state.distress_announced = false;
            false
        } else if status.health < tuning.distress_health && !state.distress_announced {
            state.distress_announced = true;
            true
        } else {
            false
        }
    };
    if announce {
        info!(agent = %agent.name, health = status.health, "eat.distress");
        agent
            .send(&agent.announce_recipient(), DISTRESS_MESSAGE)
            .await;
    }

    let inventory = holdings(agent).await?;
    if status.health < tuning.emergency_health {
        let emergency = EMERGENCY_FOODS
            .iter()
            .find_map(|name| inventory.iter().find(|i| i.name == *name));
        if let Some(item) = emergency {
            eat(agent, item).await?;
            info!(agent = %agent.name, item = %item.name, health = status.health, "eat.emergency");
            return Ok(EatOutcome::Ate(item.name.clone()));
        }
    }

    if status.food < tuning.hunger_threshold {
        return match best_food(agent, &inventory) {
            Some(item) => {
                eat(agent, item).await?;
                info!(agent = %agent.name, item = %item.name, food = status.food, "eat.ate");
                Ok(EatOutcome::Ate(item.name.clone()))
            }
            None => Ok(EatOutcome::NothingToEat),
        };
    }
    Ok(EatOutcome::Satisfied)
}

pub(super) async fn run(agent: Arc<AgentLoop>) {
    let mut ticker = tokio::time::interval(agent.tuning.eat_interval());
    loop {
        ticker.tick().await;
        if let Err(err) = check_once(&agent).await {
            debug!(agent = %agent.name, "eat.failed: {err}");
        }
    }
}
