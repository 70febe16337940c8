//! Response translation from `OpenAI` Chat Completions to the Anthropic Messages format.
//!
//! Covers whole completions ([`response`]) and SSE streams ([`streaming`],
//! framed by [`sse`]). Everything here is pure apart from the byte-stream
//! adapter, which only reads its input stream.

pub mod anthropic_types;
pub mod openai_types;
pub mod response;
pub mod sse;
pub mod streaming;
