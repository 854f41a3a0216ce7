//! Backend bridge: command types and the worker thread that talks to the engine.

pub mod commands;
pub mod runtime;
