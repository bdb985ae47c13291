//! Device wire protocol.

pub mod frames;

pub use frames::{FrameError, Handshake, InboundFrame, ServerFrame, classify, decode_handshake};
