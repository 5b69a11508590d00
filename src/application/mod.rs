// Application layer: session cache, extraction calls and export preparation.
// The CLI talks only to this layer; the domain mapper stays free of I/O.

pub mod error;
pub mod extraction;
pub mod service;

pub use error::*;
pub use extraction::*;
pub use service::*;
