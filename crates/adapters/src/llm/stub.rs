//! Stub generator for testing and offline mode

use async_trait::async_trait;
use autopost_domain::{GenerateError, GenerateInput, TextGenerator};

/// Stub generator that returns configurable responses
pub struct StubGenerator {
    response: Option<String>,
    error: Option<GenerateError>,
}

impl StubGenerator {
    /// Create a stub that returns a specific response
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            error: None,
        }
    }

    /// Create a stub that always returns an error
    pub fn with_error(error: GenerateError) -> Self {
        Self {
            response: None,
            error: Some(error),
        }
    }

    /// Create a stub that writes a post from the hint
    pub fn echo() -> Self {
        Self {
            response: None,
            error: None,
        }
    }
}

impl Default for StubGenerator {
    fn default() -> Self {
        Self::echo()
    }
}

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate(&self, input: GenerateInput) -> Result<String, GenerateError> {
        if let Some(ref error) = self.error {
            return Err(match error {
                GenerateError::Api(msg) => GenerateError::Api(msg.clone()),
                GenerateError::InvalidFormat(msg) => GenerateError::InvalidFormat(msg.clone()),
                GenerateError::RateLimited => GenerateError::RateLimited,
                GenerateError::Timeout => GenerateError::Timeout,
                GenerateError::Config(msg) => GenerateError::Config(msg.clone()),
            });
        }

        if let Some(ref response) = self.response {
            return Ok(response.clone());
        }

        Ok(format!("Stub post ({}): {}", input.language, input.hint.trim()))
    }
}
