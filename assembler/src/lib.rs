//! Streaming-answer assembly engine
//!
//! Consumes the retrieval collaborator's event stream and incrementally
//! reconstructs a display-ready [`shared_types::Message`]: answer content,
//! reasoning text, and citations resolved as their metadata arrives. The
//! cold-load path in the server produces the same shape from storage, so
//! renderers never know which path built the message.

pub mod assembler;
pub mod citations;
pub mod decoder;

pub use assembler::{drive, Applied, AssemblyHandle, MessageAssembler, Phase, StreamOutcome};
pub use citations::{bind_markers, scan_markers, InlineMarker, MarkerBinding};
pub use decoder::{DecodeError, EventDecoder};
