//! Internal utility helpers for the result cache and date cutoffs.

pub mod cache;
pub mod date;
