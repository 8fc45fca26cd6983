use annalist_core::{AppError, AppResult};
use annalist_domain::Action;

/// Default message template for tracked changes.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "activity.{target}-{action}";

/// Configuration of a change tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    message_template: String,
}

impl TrackerConfig {
    /// Creates a configuration with a custom message template.
    ///
    /// `{target}` is replaced by the target type and `{action}` by the action.
    pub fn new(message_template: impl Into<String>) -> AppResult<Self> {
        let message_template = message_template.into();
        if message_template.trim().is_empty() {
            return Err(AppError::Validation(
                "tracker message template must not be empty".to_owned(),
            ));
        }

        Ok(Self { message_template })
    }

    /// Returns the message template.
    #[must_use]
    pub fn message_template(&self) -> &str {
        self.message_template.as_str()
    }

    /// Renders the message for one tracked change.
    #[must_use]
    pub fn render_message(&self, entity_type: &str, action: Action) -> String {
        self.message_template
            .replace("{target}", entity_type)
            .replace("{action}", action.as_str())
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_owned(),
        }
    }
}
