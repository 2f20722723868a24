pub mod error;
pub mod types;
pub mod value;

pub use error::{PersistError, Result};
pub use types::{Params, Row};
pub use value::{FromValue, TIMESTAMP_FORMAT, Value};
