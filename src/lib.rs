//! pcdb: an append-only time-series log for NOR-like flash.
//!
//! The hard engineering lives in the on-flash log format: a pre-header
//! payload region followed by a single program-page commit header, written
//! last, CRC32C-protected, so that a power loss mid-write either leaves the
//! segment looking untouched or corrupt but never half-committed.
//!
//! Layering, leaves first: [`flash`] (the device contract) under
//! [`segment`] (the on-flash format) under [`block_writer`] and
//! [`appender`] (ways to fill a segment) under [`alloc_seg`] (segment
//! selection) and [`recover`] (forward scan), with [`ring`] and [`db`]
//! tying single-producer writes to single-consumer flushes on top.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod error;
pub mod crc32c;
pub mod flash;
pub mod segment;
pub mod block_writer;
pub mod appender;
pub mod alloc_seg;
pub mod recover;
pub mod ring;
pub mod db;

pub use error::{Error, Result};
