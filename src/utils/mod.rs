//! Shared helpers used across the interpreter.

pub mod json_ext;
