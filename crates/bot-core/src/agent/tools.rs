use std::fmt;

use super::observation::Vec3;
use super::wire::{Arg, Command};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    UnknownCommand(String),
    InvalidArguments {
        command: &'static str,
        reason: String,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnknownCommand(name) => write!(f, "unknown command: {name}"),
            ParseError::InvalidArguments { command, reason } => {
                write!(f, "!{command} {reason}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Item argument of the batch-capable commands: `*`/`all`, or a named item with an amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Item { name: String, amount: u32 },
}

impl Selection {
    fn from_args(item: &Arg, amount: Option<&Arg>) -> Self {
        let name = item.text();
        if name == "*" || name.eq_ignore_ascii_case("all") {
            return Selection::All;
        }
        Selection::Item {
            name,
            amount: count_or(amount, 1),
        }
    }
}

/// Typed action command, validated from a parsed `Command`.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Help,
    Stop,
    Restart,
    ClearChat,
    GoToPlayer { player: String, range: f64 },
    FollowPlayer { player: String, range: f64 },
    GoToCoordinates { target: Vec3, range: f64 },
    SearchForBlock { block: String, range: f64 },
    SearchForEntity { entity: String, range: f64 },
    MoveAway { distance: f64 },
    RememberHere { place: String },
    GoToRememberedPlace { place: String },
    /// `None` stays until told otherwise.
    Stay { seconds: Option<u64> },
    GivePlayer { player: String, items: Selection },
    Consume { item: String },
    Equip { item: String },
    Discard { items: Selection },
    PutInChest { items: Selection },
    TakeFromChest { items: Selection },
    CraftRecipe { item: String, amount: u32 },
    SmeltItem { item: String, amount: u32 },
    ClearFurnace,
    CollectBlocks { block: String, count: u32 },
    DigDown { count: u32 },
    PlaceHere { item: String },
    Activate { block: String },
    GoToBed,
    Attack { entity: String },
    AttackPlayer { player: String },
    StartConversation { player: String, message: String },
}

impl Action {
    /// Actions that keep running after the dispatcher returns and are cancelled by `!stop`.
    pub fn is_continuous(&self) -> bool {
        matches!(
            self,
            Action::FollowPlayer { .. }
                | Action::Stay { .. }
                | Action::Attack { .. }
                | Action::AttackPlayer { .. }
                | Action::CollectBlocks { .. }
                | Action::DigDown { .. }
        )
    }
}

fn required_text(
    cmd: &Command,
    idx: usize,
    command: &'static str,
    what: &str,
) -> Result<String, ParseError> {
    match cmd.arg(idx) {
        Some(arg) => Ok(arg.text()),
        None => Err(ParseError::InvalidArguments {
            command,
            reason: format!("needs {what}"),
        }),
    }
}

/// Numeric argument; zero or non-numeric text falls back to `default`.
fn number_or(arg: Option<&Arg>, default: f64) -> f64 {
    arg.and_then(Arg::as_f64)
        .filter(|n| *n != 0.0)
        .unwrap_or(default)
}

/// Positive count argument; zero, negative or non-numeric text falls back to `default`.
fn count_or(arg: Option<&Arg>, default: u32) -> u32 {
    arg.and_then(Arg::as_int)
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(default)
}

fn coordinate(cmd: &Command, idx: usize) -> Result<f64, ParseError> {
    cmd.arg(idx)
        .and_then(Arg::as_f64)
        .ok_or_else(|| ParseError::InvalidArguments {
            command: "goToCoordinates",
            reason: "needs numeric x, y and z".to_string(),
        })
}

impl TryFrom<&Command> for Action {
    type Error = ParseError;

    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        let action = match cmd.name.as_str() {
            "help" => Action::Help,
            "stop" => Action::Stop,
            "restart" => Action::Restart,
            "clearChat" => Action::ClearChat,
            "goToPlayer" => Action::GoToPlayer {
                player: required_text(cmd, 0, "goToPlayer", "a player name")?,
                range: number_or(cmd.arg(1), 2.0),
            },
            "followPlayer" => Action::FollowPlayer {
                player: required_text(cmd, 0, "followPlayer", "a player name")?,
                range: number_or(cmd.arg(1), 3.0),
            },
            "goToCoordinates" => Action::GoToCoordinates {
                target: Vec3::new(coordinate(cmd, 0)?, coordinate(cmd, 1)?, coordinate(cmd, 2)?),
                range: number_or(cmd.arg(3), 1.0),
            },
            "searchForBlock" => Action::SearchForBlock {
                block: required_text(cmd, 0, "searchForBlock", "a block type")?,
                range: number_or(cmd.arg(1), 16.0),
            },
            "searchForEntity" => Action::SearchForEntity {
                entity: required_text(cmd, 0, "searchForEntity", "an entity type")?,
                range: number_or(cmd.arg(1), 16.0),
            },
            "moveAway" => Action::MoveAway {
                distance: number_or(cmd.arg(0), 5.0),
            },
            "rememberHere" => Action::RememberHere {
                place: required_text(cmd, 0, "rememberHere", "a place name")?,
            },
            "goToRememberedPlace" => Action::GoToRememberedPlace {
                place: required_text(cmd, 0, "goToRememberedPlace", "a place name")?,
            },
            "stay" => {
                let secs = cmd.arg(0).and_then(Arg::as_int).unwrap_or(-1);
                Action::Stay {
                    seconds: u64::try_from(secs).ok().filter(|s| *s > 0),
                }
            }
            "givePlayer" => Action::GivePlayer {
                player: required_text(cmd, 0, "givePlayer", "a player name")?,
                items: match cmd.arg(1) {
                    Some(item) => Selection::from_args(item, cmd.arg(2)),
                    None => {
                        return Err(ParseError::InvalidArguments {
                            command: "givePlayer",
                            reason: "needs an item name".to_string(),
                        });
                    }
                },
            },
            "consume" => Action::Consume {
                item: required_text(cmd, 0, "consume", "an item name")?,
            },
            "equip" => Action::Equip {
                item: required_text(cmd, 0, "equip", "an item name")?,
            },
            "discard" | "putInChest" | "takeFromChest" => {
                let Some(item) = cmd.arg(0) else {
                    return Err(ParseError::InvalidArguments {
                        command: static_name(&cmd.name),
                        reason: "needs an item name or *".to_string(),
                    });
                };
                let items = Selection::from_args(item, cmd.arg(1));
                match cmd.name.as_str() {
                    "discard" => Action::Discard { items },
                    "putInChest" => Action::PutInChest { items },
                    _ => Action::TakeFromChest { items },
                }
            }
            "craftRecipe" => Action::CraftRecipe {
                item: required_text(cmd, 0, "craftRecipe", "an item name")?,
                amount: count_or(cmd.arg(1), 1),
            },
            "smeltItem" => Action::SmeltItem {
                item: required_text(cmd, 0, "smeltItem", "an item name")?,
                amount: count_or(cmd.arg(1), 1),
            },
            "clearFurnace" => Action::ClearFurnace,
            "collectBlocks" => Action::CollectBlocks {
                block: required_text(cmd, 0, "collectBlocks", "a block type")?,
                count: count_or(cmd.arg(1), 1),
            },
            "digDown" => Action::DigDown {
                count: count_or(cmd.arg(0), 1),
            },
            "placeHere" => Action::PlaceHere {
                item: required_text(cmd, 0, "placeHere", "a block name")?,
            },
            "activate" => Action::Activate {
                block: required_text(cmd, 0, "activate", "a block type")?,
            },
            "goToBed" => Action::GoToBed,
            "attack" => Action::Attack {
                entity: required_text(cmd, 0, "attack", "an entity type")?,
            },
            "attackPlayer" => Action::AttackPlayer {
                player: required_text(cmd, 0, "attackPlayer", "a player name")?,
            },
            "startConversation" => Action::StartConversation {
                player: required_text(cmd, 0, "startConversation", "a player name")?,
                message: cmd
                    .args
                    .iter()
                    .skip(1)
                    .map(Arg::text)
                    .collect::<Vec<_>>()
                    .join(", "),
            },
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };
        Ok(action)
    }
}

fn static_name(name: &str) -> &'static str {
    match name {
        "discard" => "discard",
        "putInChest" => "putInChest",
        _ => "takeFromChest",
    }
}
