//! Outer surfaces: the text-command console and CSV output.

pub mod console;
pub mod csv;
