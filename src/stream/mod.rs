pub mod framer;
pub mod interpreter;

pub use framer::{ frames, Frame, FrameDecoder };
pub use interpreter::{
    CloseReason,
    StreamInterpreter,
    StreamOutcome,
    StreamState,
    STREAM_FAILURE_MESSAGE,
};
