pub const DEFAULT_PERSONALITY: &str = "You are a friendly and helpful player.";

/// Replaces every `{NAME}` placeholder listed in `vars`; unknown placeholders stay as written.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}

/// System prompt for one agent.
pub fn persona_prompt(template: &str, username: &str, personality: Option<&str>) -> String {
    render_template(
        template,
        &[
            ("USERNAME", username),
            ("PERSONALITY", personality.unwrap_or(DEFAULT_PERSONALITY)),
        ],
    )
}

pub const HELP_TEXT: &str = "Queries: !stats !inventory !nearbyBlocks !entities !savedPlaces !viewChest. \
Actions: !goToPlayer(name, range) !followPlayer(name, range) !goToCoordinates(x, y, z, range) \
!searchForBlock(type, range) !searchForEntity(type, range) !moveAway(distance) !rememberHere(name) \
!goToRememberedPlace(name) !stay(seconds) !givePlayer(name, item|*, amount) !consume(item) !equip(item) \
!discard(item|*, amount) !putInChest(item|*, amount) !takeFromChest(item|*, amount) \
!craftRecipe(item, amount) !smeltItem(item, amount) !clearFurnace !collectBlocks(type, count) \
!digDown(count) !placeHere(block) !activate(block) !goToBed !attack(type) !attackPlayer(name) \
!startConversation(name, message) !clearChat !restart !stop";
