// src/services/mod.rs

pub mod generator;
pub mod lifecycle;
pub mod prompt;
pub mod scoring;
