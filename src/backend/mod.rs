//! Backend module - adapter trait, failure classification and vendor adapters

pub mod classify;
pub mod freepik;
pub mod google_imagen;
pub mod leonardo;
pub mod openai_compatible;
pub mod provider;
pub mod registry;
pub mod traits;

pub use classify::{FailureKind, ProviderError};
pub use traits::{
    BackendKind, BackendStatus, GenerateOutput, GeneratedImage, GenerationRequest, ImageBackend,
    QuotaInfo,
};
