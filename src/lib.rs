pub mod audit;
pub mod classify;
pub mod cleanup;
pub mod config;
pub mod domain;
pub mod error;
pub mod labels;
pub mod materialize;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod samples;
pub mod scope;
pub mod store;
