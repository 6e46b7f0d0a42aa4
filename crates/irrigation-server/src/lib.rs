//! HTTP front end for the irrigation decision engine

pub mod api;
pub mod config;
