#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod events;
pub mod io;
pub mod ops;
pub mod raster;
pub mod session;
pub mod settings;

pub use error::EditError;
pub use session::EditSession;
