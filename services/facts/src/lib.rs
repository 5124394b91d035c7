//! Fact table generation for the cooperative analytics star schema.
//!
//! Pipeline: [`sources`] → [`resolver`] + [`global`] → [`engine`] with the
//! [`kpi`] calculators → [`output`]. [`pipeline::run`] wires it together.

pub mod config;
pub mod engine;
pub mod global;
pub mod kpi;
pub mod output;
pub mod pipeline;
pub mod resolver;
pub mod sources;

pub use config::Config;
