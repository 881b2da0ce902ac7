pub mod analytics;
pub mod attendance;
pub mod auth;
pub mod backup;
pub mod config;
pub mod core;
pub mod data;
pub mod exchange;
pub mod marks;
pub mod remarks;
pub mod reports;
pub mod students;
pub mod subjects;
pub mod teachers;
