//! filex-server — thin facade re-exporting the core library and HTTP surface
//! so the CLI binary (`main.rs`) has one place to pull both from.

pub use filex_core as core;
pub use filex_http as http;
