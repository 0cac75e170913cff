pub mod engine;
pub mod io;
pub mod line;
pub mod status;

pub use engine::UsbSerial;
pub use line::line_len;
pub use status::{CommsError, CommsStatus, ReadOutcome};
