//! Protocol module containing the telemetry frame schema, the stream
//! extractor, and the wire envelope codec.

pub mod extractor;
pub mod frame;
pub mod wire;

pub use extractor::{ExtractorStats, FrameExtractor};
pub use frame::{TelemetryFrame, FRAME_PAYLOAD_SIZE, SYNCHRO_WORD};
pub use wire::{decode_event, encode_event, WireError, WireEvent};
