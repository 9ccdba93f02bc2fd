pub mod error;

pub use error::{LockResultExt, PrimeError};
