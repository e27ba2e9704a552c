pub mod codec;
pub mod display;
pub mod engine;
pub mod game_state;

pub use crate::codec::*;
pub use crate::display::*;
pub use crate::engine::*;
pub use crate::game_state::*;

pub use shakmaty::Move;
