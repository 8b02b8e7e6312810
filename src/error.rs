//! Error types for board operations

use thiserror::Error;

use crate::types::{ColumnId, ProjectId, TaskId};

/// Result type for board operations
pub type Result<T> = std::result::Result<T, BoardError>;

/// Errors that can occur while mutating a board
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// A required field was empty or malformed
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("project not found: {id}")]
    ProjectNotFound { id: ProjectId },

    #[error("column not found: {id}")]
    ColumnNotFound { id: ColumnId },

    #[error("task not found: {id}")]
    TaskNotFound { id: TaskId },

    /// Column still holds tasks and cannot be deleted
    #[error("column '{id}' has {count} tasks; move or delete them first")]
    ColumnNotEmpty { id: ColumnId, count: usize },

    /// The confirmation gate answered "no"
    #[error("operation cancelled")]
    Cancelled,

    /// A gesture is already active
    #[error("a drag gesture is already in progress")]
    DragInProgress,

    #[error("no drag gesture is in progress")]
    NoActiveDrag,

    /// The dragged id matches neither a task nor a column
    #[error("'{id}' is not a draggable task or column")]
    InvalidDragItem { id: String },
}

impl BoardError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_not_empty_message() {
        let err = BoardError::ColumnNotEmpty {
            id: ColumnId::from("todo"),
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "column 'todo' has 2 tasks; move or delete them first"
        );
    }

    #[test]
    fn test_validation_message_names_field() {
        let err = BoardError::validation("title", "cannot be empty");
        assert_eq!(err.to_string(), "invalid title: cannot be empty");
    }
}
