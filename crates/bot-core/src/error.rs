use thiserror::Error;

/// Failure reported by the world connection collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorldError {
    /// The world rejected the operation; the payload is the collaborator's cause string.
    #[error("{0}")]
    Rejected(String),
    #[error("world connection closed")]
    Disconnected,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("malformed bridge payload: {0}")]
    Protocol(String),
}

pub type WorldResult<T> = Result<T, WorldError>;

/// Terminal failure of an action handler. The `Display` text is what the requesting
/// user sees, so every variant renders as a complete sentence.
#[derive(Debug, Error)]
pub enum ActionError {
    /// A referenced player/item/block/place/recipe does not exist or is insufficient.
    #[error("{0}")]
    Resolution(String),
    /// The world collaborator rejected a mutation.
    #[error("{context}: {source}")]
    Rejected {
        context: String,
        #[source]
        source: WorldError,
    },
}

impl ActionError {
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    pub fn rejected(context: impl Into<String>, source: WorldError) -> Self {
        Self::Rejected {
            context: context.into(),
            source,
        }
    }
}

/// Attaches a user-facing context prefix to a world rejection.
pub trait FailedContext<T> {
    fn failed<F: FnOnce() -> String>(self, context: F) -> Result<T, ActionError>;
}

impl<T> FailedContext<T> for WorldResult<T> {
    fn failed<F: FnOnce() -> String>(self, context: F) -> Result<T, ActionError> {
        self.map_err(|source| ActionError::rejected(context(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_renders_context_and_cause() {
        let res: WorldResult<()> = Err(WorldError::Rejected("slot occupied".to_string()));
        let err = res.failed(|| "Failed to equip iron_helmet".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Failed to equip iron_helmet: slot occupied");
    }

    #[test]
    fn resolution_is_the_plain_sentence() {
        let err = ActionError::resolution("Player Alex not found.");
        assert_eq!(err.to_string(), "Player Alex not found.");
    }
}
