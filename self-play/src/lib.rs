mod opening_book;
mod options;
mod play_rollout;
mod prompt;
mod rollout_persistance;
mod trajectory;

pub use opening_book::*;
pub use options::*;
pub use play_rollout::*;
pub use prompt::*;
pub use rollout_persistance::*;
pub use trajectory::*;
