//! different utility modules used throughout the project
/// tiny module to set up console/file logging
pub mod logger;
