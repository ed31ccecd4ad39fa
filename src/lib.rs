pub mod batch;
pub mod compare;
pub mod config;
pub mod db;
pub mod discovery;
pub mod error;
pub mod inference;
pub mod normalize;
pub mod profiles;
pub mod report;
pub mod types;

pub use batch::{BatchRunner, FixedDelay, Pacer, RunOutcome, RunPhase};
pub use compare::{compare_fields, compare_results, ComparisonReport, FieldComparison};
pub use config::Config;
pub use error::AppError;
pub use inference::{extract_document, GeminiClient, InferenceBackend, OpenAiClient, Provider, ProviderRouter};
pub use profiles::{ExtractionProfile, ProfileKind};
pub use types::{ExtractionError, ExtractionResult, ResultsTable};
