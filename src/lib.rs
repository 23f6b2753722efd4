//! Multi-period, multi-node energy system planning.
//!
//! A system of nodes, technologies and network arcs is formulated as a single mixed-integer
//! linear program over several investment periods. Chronological time series are first reduced
//! to a small number of representative blocks by the [`aggregation`] module.
#![warn(missing_docs)]
pub mod aggregation;
pub mod asset;
pub mod carrier;
pub mod cli;
pub mod error;
pub mod finance;
pub mod id;
pub mod input;
pub mod log;
pub mod network;
pub mod node;
pub mod optimisation;
pub mod output;
pub mod parameter;
pub mod parameters;
pub mod period;
pub mod registry;
pub mod settings;
pub mod technology;
pub mod time_series;
pub mod units;

#[cfg(test)]
mod fixture;
