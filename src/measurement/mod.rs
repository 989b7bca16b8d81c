//! Measurement ingestion: payload decoding, latest-reading storage,
//! pseudo-load profiles, and per-cycle vector assembly.

pub mod builder;
pub mod device;
pub mod pseudo;
pub mod reading;
pub mod table;
