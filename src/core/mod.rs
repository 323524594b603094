pub mod config;
pub mod engine;
pub mod model;
pub mod source;
pub mod trackers;
pub mod view;
