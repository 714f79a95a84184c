pub mod funding;
pub mod pool;
pub mod relayer;

pub use funding::*;
pub use pool::*;
pub use relayer::*;
