pub mod api;
pub mod config;
pub mod db;
pub mod decay;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod game;
pub mod metrics;
pub mod rank;
pub mod scoring;
pub mod signals;
pub mod throttle;
pub mod usage;
