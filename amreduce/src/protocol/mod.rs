pub(crate) mod codec;
pub(crate) mod header;
mod message;

pub use codec::{decode_frame, encode_frame};
pub use header::{FrameKind, HEADER_SIZE, Header, WIRE_VERSION};
pub use message::{Phase, StepMessage, pack_elements, unpack_elements};
