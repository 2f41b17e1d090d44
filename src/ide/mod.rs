//! IDE-facing features: buffer rip-off, scope analysis, cursor context
//! resolution and the completion engine.

pub mod buffer;
pub mod completion;
pub mod cursor;
pub mod ripper;

pub use buffer::analyze_buffer;
pub use completion::{Candidate, Completion, Session};
pub use cursor::{deduce_cursor_context, CursorContext, CursorLoc};
pub use ripper::{rip_off, Ripped};
