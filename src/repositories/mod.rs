pub mod audit;
pub mod transaction;

pub use audit::*;
pub use transaction::*;
