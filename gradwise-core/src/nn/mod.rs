// src/nn/mod.rs

pub mod parameter; // struct Parameter

pub use parameter::{Parameter, SharedParameter};
