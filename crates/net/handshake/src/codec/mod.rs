//! Wire codecs: the fixed handshake header and the length-prefixed message frames that
//! follow it.

mod frame;
pub use frame::{FramedMsgRW, MAX_PAYLOAD_SIZE, MsgReadWriter};

mod header;
pub use header::{HEADER_LEN, HsHeader, MAGIC_MAIN, MAGIC_TEST, read_header};
