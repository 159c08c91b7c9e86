mod tokio;

pub use self::tokio::*;
