mod block;
mod receipt;
mod transaction;

pub use block::*;
pub use receipt::*;
pub use transaction::*;
