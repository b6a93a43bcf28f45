// src/utils/mod.rs

pub mod json;
