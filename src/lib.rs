pub mod agent;
pub mod api;
pub mod config;
pub mod downloader;
pub mod error;
pub mod gemini;
pub mod request;
pub mod session;
pub mod temp_file;

pub use agent::{AgentClient, AnalysisResult};
pub use error::{AnalysisError, FailureKind, SessionError, ValidationError};
pub use request::{AnalysisRequest, MediaRef};
pub use session::{SessionController, SessionSettings, SessionView};
pub use temp_file::ManagedTempFile;
