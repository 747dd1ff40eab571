// Crate root library declaration and module exports.
pub mod checkpoint;
pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod import;
pub mod model;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod sheet;
pub mod storage;
