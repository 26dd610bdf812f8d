use crate::ast::Position;

/// A script that failed the static check, located at `position`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at {position}")]
pub struct ValidationError {
    pub position: Position,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn at(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("script produced no solid; bind the final shape to `result`")]
    NoArtifactProduced,

    #[error(
        "script produced several solids ({}); bind the intended one to `result`",
        .candidates.join(", ")
    )]
    AmbiguousArtifact { candidates: Vec<String> },

    #[error("{message}{}", position_suffix(.position))]
    RuntimeFailure {
        message: String,
        position: Option<Position>,
    },
}

impl ExecutionError {
    pub(crate) fn runtime(position: Position, message: impl Into<String>) -> Self {
        Self::RuntimeFailure {
            message: message.into(),
            position: Some(position),
        }
    }
}

fn position_suffix(position: &Option<Position>) -> String {
    position
        .map(|position| format!(" at {position}"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{ExecutionError, ValidationError};
    use crate::ast::Position;

    #[test]
    fn messages_carry_positions() {
        let err = ValidationError::at(Position::new(3, 7), "expected expression");
        assert_eq!(err.to_string(), "expected expression at line 3, column 7");

        let err = ExecutionError::runtime(Position::new(2, 1), "division by zero");
        assert_eq!(err.to_string(), "division by zero at line 2, column 1");

        let err = ExecutionError::RuntimeFailure {
            message: "operation limit exceeded".to_string(),
            position: None,
        };
        assert_eq!(err.to_string(), "operation limit exceeded");
    }

    #[test]
    fn ambiguity_lists_candidates() {
        let err = ExecutionError::AmbiguousArtifact {
            candidates: vec!["base".to_string(), "peg".to_string()],
        };
        assert!(err.to_string().contains("(base, peg)"));
    }
}
