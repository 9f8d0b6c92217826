//! Bugtrail - leakage-safe defect datasets from commit history
//!
//! Labels methods as buggy per release with an SZZ variant, joins the labels
//! with static and process metrics into a method-per-release dataset, and
//! evaluates classifiers on it with walk-forward validation.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod git;
pub mod issues;
pub mod matcher;
pub mod metrics;
pub mod ml;
pub mod models;
pub mod parsers;
pub mod szz;
pub mod timeline;
