//! Command handlers

pub mod config;
pub mod course;
pub mod status;
pub mod task;
pub mod transfer;
