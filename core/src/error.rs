use thiserror::Error;

/// Failures of the diet plan pipeline.
///
/// The HTTP layer turns every variant except [`PipelineError::Internal`] into a
/// 400 carrying the message, so those messages are written for end users.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input is missing or malformed.
    #[error("{0}")]
    Validation(String),
    /// The text generation provider cannot be constructed.
    #[error("AI service is not configured: {0}")]
    ServiceConfiguration(String),
    /// The text generation call itself failed.
    #[error("AI service error: {0}")]
    Service(String),
    /// Model output did not contain the expected JSON.
    #[error("Failed to parse AI response: {0}")]
    ResponseParse(String),
    /// The model referenced an ingredient id that is not in the catalog.
    #[error("Ingredient {0} not found in catalog")]
    IngredientNotFound(i64),
    /// The plan could not be written; nothing was committed.
    #[error("Failed to save diet plan: {0}")]
    Persistence(String),
    /// Reading stored context failed.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PipelineError {
    pub(crate) fn persistence(err: &anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            PipelineError::IngredientNotFound(42).to_string(),
            "Ingredient 42 not found in catalog"
        );
        assert_eq!(
            PipelineError::ServiceConfiguration("GEMINI_API_KEY is not set".into()).to_string(),
            "AI service is not configured: GEMINI_API_KEY is not set"
        );
        assert_eq!(
            PipelineError::Validation("age is required".into()).to_string(),
            "age is required"
        );
    }

    #[test]
    fn test_persistence_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("insert diet plan");
        let mapped = PipelineError::persistence(&err);
        assert_eq!(
            mapped.to_string(),
            "Failed to save diet plan: insert diet plan: disk full"
        );
    }
}
