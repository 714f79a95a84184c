pub mod gas;
pub mod provider;
pub mod signer;

pub use gas::*;
pub use provider::*;
pub use signer::*;
