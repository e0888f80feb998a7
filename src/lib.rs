pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod export;
pub mod pipeline;
pub mod tables;
