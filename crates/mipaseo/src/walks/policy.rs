use crate::config::ServiceConfig;

use super::error::WalkError;
use super::store::PageRequest;

/// Input bounds shared by the lifecycle controller and the review service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkPolicy {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub comment_max_len: usize,
    pub notes_max_len: usize,
}

impl WalkPolicy {
    pub fn page(&self, page: Option<u32>, limit: Option<u32>) -> PageRequest {
        PageRequest::normalized(page, limit, self.default_page_size, self.max_page_size)
    }

    /// Trim free text; blank becomes `None`, overlong input is a validation error.
    pub fn bounded_text(
        &self,
        field: &'static str,
        value: Option<String>,
        max_len: usize,
    ) -> Result<Option<String>, WalkError> {
        let Some(value) = value else {
            return Ok(None);
        };
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let length = trimmed.chars().count();
        if length > max_len {
            return Err(WalkError::Validation(format!(
                "{field} must be at most {max_len} characters (found {length})"
            )));
        }
        Ok(Some(trimmed.to_string()))
    }

    pub fn notes(&self, value: Option<String>) -> Result<Option<String>, WalkError> {
        self.bounded_text("notes", value, self.notes_max_len)
    }

    pub fn comment(&self, value: Option<String>) -> Result<Option<String>, WalkError> {
        self.bounded_text("comment", value, self.comment_max_len)
    }
}

impl Default for WalkPolicy {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for WalkPolicy {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            default_page_size: config.default_page_size.max(1),
            max_page_size: config.max_page_size.max(1),
            comment_max_len: config.comment_max_len,
            notes_max_len: config.notes_max_len,
        }
    }
}
