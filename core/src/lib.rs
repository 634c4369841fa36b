//! Core library for the ladle recipe costing toolkit.
//!
//! Resolves the true cost of recipes built from raw ingredients and nested
//! sub-recipes, converting quantities and money across units and currencies
//! along the way. The composition graph is kept acyclic by a validator that
//! gates every graph-mutating write; prep sheets aggregate many scaled
//! recipes into one shopping list; version snapshots make recipe changes
//! diffable and reversible.
//!
//! [`service::LadleService`] is the entry point: it owns the database and
//! wires the engine, validator, and aggregator to it. The computation
//! modules ([`cost`], [`graph`], [`prep_sheet`], [`diff`], [`units`],
//! [`currency`]) only ever see the collaborator traits, so tests drive them
//! with in-memory fakes.

pub mod cost;
pub mod currency;
pub mod db;
pub mod diff;
pub mod error;
pub mod graph;
pub mod models;
pub mod prep_sheet;
pub mod service;
pub mod units;

pub use error::CostError;
