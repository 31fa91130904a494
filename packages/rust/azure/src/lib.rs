//! HTTP collaborators for archdoc: Azure OpenAI (chat + embeddings) and
//! Azure AI Search (hybrid retrieval).
//!
//! Both clients implement the `archdoc-core` service traits, so the CLI can
//! hand them straight to the orchestrator.

mod http;
mod openai;
mod search;

pub use openai::AzureOpenAiClient;
pub use search::AzureSearchClient;
