//! Rental Investment Dashboard
//!
//! Backend for a form-driven property analysis tool:
//! - Gross yield, cashflow before financing, micro vs real tax regime
//! - Photo audit producing a shopping list through a multimodal model
//! - Self-contained white-label HTML report
//! - Streamed chat assistant with a per-session transcript
//!
//! FLOW:
//! INPUTS → FIGURES → (PHOTOS → NARRATIVE) → REPORT, with CHAT alongside

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod financial;
pub mod llm;
pub mod models;
pub mod report;
pub mod session;
pub mod shopping;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use config::{AppConfig, TaxParameters};
pub use financial::compute_financials;
pub use report::assemble_report;
