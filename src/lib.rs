pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod server;
pub mod translate;

pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use logging::SharedLogger;
pub use server::{build_router, AppState};
pub use translate::response::openai_to_anthropic;
pub use translate::streaming::{translate_stream, StreamTranslator};
