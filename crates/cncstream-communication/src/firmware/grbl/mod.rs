//! GRBL protocol support
//!
//! Line grammar, status report parsing and error/alarm decoding shared by
//! Grbl 1.1, grblHAL and (through [`crate::firmware::fluidnc`]) FluidNC.

pub mod error_decoder;
pub mod response_parser;
pub mod status_parser;

pub use error_decoder::{decode_alarm, decode_error, format_alarm, format_error};
pub use response_parser::parse_line;
pub use status_parser::StatusParser;
