use async_trait::async_trait;
use serde::Serialize;

use crate::error::AnalysisError;
use crate::request::AnalysisRequest;

/// Text returned by the model for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    pub text: String,
    pub model: String,
}

/// A hosted multimodal model.
///
/// Implementations perform one analysis per call with no retry, and classify
/// their own failures into [`AnalysisError`]. Media uploaded to the provider
/// along the way may or may not be cleaned up remotely.
#[async_trait]
pub trait AgentClient: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;

    /// Model identifier, for display.
    fn model(&self) -> &str;
}
