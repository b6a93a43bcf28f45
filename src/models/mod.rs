// src/models/mod.rs

pub mod processing;
pub mod question;
pub mod quiz;
pub mod response;
pub mod submission;
