//! Betting-Slip OCR Ingestion Service
//!
//! This library provides the core functionality for the slip-scan system:
//! chat users upload betting-slip screenshots, a sidecar OCR engine reads
//! them, recognized text is parsed into structured slip legs, and every job
//! and result is persisted under a mounted data volume.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
