pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod error_recovery;
pub mod logging;
pub mod models;
pub mod quiz;

pub use error::*;
pub use models::*;

#[cfg(test)]
mod testing;
