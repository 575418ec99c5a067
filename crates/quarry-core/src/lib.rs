pub mod descriptor;
pub use descriptor::Descriptor;

pub mod driver;
pub use driver::Connection;

mod error;
pub use error::Error;

pub mod kind;
pub use kind::{Alias, Kind, KindRegistry};

pub mod validate;
pub use validate::{format, Cause, FieldErrors, Formatted, Validator};

/// A Result type alias that uses Quarry's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

pub use async_trait::async_trait;
