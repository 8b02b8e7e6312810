pub mod board;
pub mod cli;
pub mod drag;
pub mod error;
pub mod logging;
pub mod ordering;
pub mod settings;
pub mod storage;
pub mod types;
pub mod views;
