mod dated;
mod interface;
mod sequence;
#[cfg(test)]
mod tests;
mod ticker;

pub use dated::*;
pub use interface::*;
pub use sequence::*;
pub use ticker::*;
