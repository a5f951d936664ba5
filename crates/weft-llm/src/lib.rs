pub mod images;
pub mod providers;
pub mod registry;
pub mod streaming;

pub use images::OpenAiImageClient;
pub use providers::openai::OpenAiClient;
pub use registry::ProviderRegistry;
