mod evaluation;
mod options;
mod pool;
mod uci;

pub use evaluation::*;
pub use options::*;
pub use pool::*;
pub use uci::*;
