//! Client for the FogBugz XML API: session lifecycle, request parameter
//! mapping and case decoding.

pub mod config;
pub mod context;
pub mod domain;
pub mod error;
pub mod infra;
pub mod services;
pub mod workflow;
