mod relayer;

pub use relayer::*;
