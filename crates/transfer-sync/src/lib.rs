pub mod abi;
pub mod accumulator;
pub mod decoder;
pub mod error;
pub mod fetch;
pub mod query;
pub mod sync;
pub mod traits;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use abi::*;
pub use accumulator::*;
pub use decoder::*;
pub use error::*;
pub use fetch::*;
pub use query::*;
pub use sync::*;
pub use traits::*;
pub use types::*;
