pub mod capability;
pub mod chart;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod preprocess;
pub mod render;
pub mod session;
pub mod store;
