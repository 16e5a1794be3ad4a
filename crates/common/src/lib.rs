//! Types shared between the Bling auth library and the token service

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
