mod error;
mod gas;
mod transaction;
mod wallet;

pub use error::*;
pub use gas::*;
pub use transaction::*;
pub use wallet::*;
