pub mod config;
pub mod enrich;
pub mod error;
pub mod lookingglass;
pub mod metrics;
pub mod net;
pub mod pipeline;
pub mod report;
