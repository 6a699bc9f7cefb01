pub mod archive;
pub mod error;
pub mod pipeline;
pub mod platform;
pub mod process;
pub mod release;
pub mod runtime;
