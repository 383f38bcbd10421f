//! Sorso: a small drinks API that memoizes expensive AI completions behind
//! a two-tier result cache (Postgres primary, local-file fallback).

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
