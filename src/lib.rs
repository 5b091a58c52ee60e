// src/lib.rs

//! `qcflow`: cycle-driven quality-control tasks.
//!
//! A [`task::TaskRunner`] hosts user monitoring code, feeds it batches from a
//! [`sampling::DataSource`] and, at the end of every cycle, publishes the
//! registered [`artifact::MonitorObject`]s through the
//! [`objects::ObjectsManager`]. Checks bound to those objects are evaluated
//! by the [`checker::CheckRunner`] right before storage, and their verdicts
//! are folded with the [`quality::Quality`] algebra.

pub mod activity;
pub mod artifact;
pub mod checker;
pub mod cli;
pub mod conditions;
pub mod config;
pub mod errors;
pub mod logging;
pub mod modules;
pub mod objects;
pub mod quality;
pub mod repository;
pub mod sampling;
pub mod service;
pub mod task;
pub mod telemetry;
pub mod types;

pub use service::run;
