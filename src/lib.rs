//! Turnstile - per-key request admission
//!
//! This crate decides whether an incoming request may proceed, based on a
//! quota tracked per caller token or per client address. The engine keeps
//! its counters in a sharded in-memory store with background eviction of
//! idle keys; the `admission` module turns its decisions into HTTP-shaped
//! outcomes without depending on any web framework.

pub mod admission;
pub mod config;
pub mod error;
pub mod ratelimit;
