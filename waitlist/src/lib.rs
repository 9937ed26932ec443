//! Event waitlist service.
//!
//! Registrants join by presenting a single-use registration code (plus a
//! late code once the late-registration cutoff has passed). Each admission
//! gets a sequential event id, a PDF identity card and a welcome email.
//! Certificates become downloadable after a release date and can be mailed
//! to everyone in one admin sweep.
//!
//! # Architecture
//!
//! - [`admission`]: the workflow as a reducer with effects, run per request
//! - [`codes`], [`ledger`]: storage behind traits, in-memory or `PostgreSQL`
//! - [`artifacts`], [`notify`], [`photos`]: rendering, email, uploads
//! - [`queries`], [`certificates`]: read side and certificate delivery
//! - [`api`], [`server`], [`bootstrap`]: the HTTP shell

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod admission;
pub mod api;
pub mod artifacts;
pub mod bootstrap;
pub mod certificates;
pub mod codes;
pub mod config;
pub mod ledger;
pub mod metrics;
#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;
pub mod notify;
pub mod photos;
pub mod queries;
pub mod server;
pub mod types;
