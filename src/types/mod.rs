//! Public types for the Skald API.

mod kind;
mod prompt;
mod request;
mod response;

pub use kind::ContentKind;
pub use prompt::PromptRef;
pub use request::{GenerationRequest, split_tags};
pub use response::{AdapterOutput, GenerationResponse};
