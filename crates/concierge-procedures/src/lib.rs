pub mod error;
pub mod executor;
pub mod matcher;
pub mod template;
pub mod types;

pub use error::{ProcedureError, Result};
pub use executor::Executor;
pub use matcher::find_matching;
