//! Train a small MLP on FashionMNIST with burn, then persist it, reload it and classify a test
//! image with the reloaded model.

pub mod checkpoint;
pub mod data;
pub mod dataset;
pub mod download;
pub mod inference;
pub mod logging;
pub mod model;
pub mod training;

mod error;

pub use error::{Error, Result};
