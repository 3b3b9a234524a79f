//! Colorbook: a colouring-page painting engine with an egui front end.
//!
//! The engine half (viewport, surface, brushes, fill, history) has no
//! window dependency and is driven through [`project::Session`].

pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod input;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;
pub mod viewport;
