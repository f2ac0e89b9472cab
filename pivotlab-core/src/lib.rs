//! PivotLab Core: domain types, history data, pivot analysis.
//!
//! This crate contains the per-symbol pipeline:
//! - Domain types (bars, marked bars, trade direction)
//! - Provider trait, Alpha Vantage client, payload normalization
//! - JSON history store with incremental merge
//! - Pivot marker, hit classifier, signal builder
//! - Float turnover cycles

pub mod analysis;
pub mod data;
pub mod domain;
pub mod turnover;
