#![allow(dead_code)]

pub mod relay;
pub mod server;
