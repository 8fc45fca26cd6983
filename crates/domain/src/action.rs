use std::str::FromStr;

use annalist_core::AppError;
use serde::{Deserialize, Serialize};

use crate::Level;

/// Classification of a tracked entity mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// The entity was inserted.
    Create,
    /// The entity or one of its collections was modified.
    Update,
    /// The entity was removed.
    Delete,
}

impl Action {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Returns the severity used for records of this action.
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            Self::Create => Level::Success,
            Self::Update => Level::Primary,
            Self::Delete => Level::Danger,
        }
    }

    /// Returns the higher-precedence action of the two.
    ///
    /// Create outranks update, update outranks delete.
    #[must_use]
    pub fn coalesce(self, other: Self) -> Self {
        self.min(other)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            _ => Err(AppError::Validation(format!(
                "unknown action value '{value}'"
            ))),
        }
    }
}
