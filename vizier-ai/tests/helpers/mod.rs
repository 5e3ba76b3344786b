//! Shared integration test helpers
#![allow(dead_code)]

pub mod image_generator;
pub mod pipeline;
