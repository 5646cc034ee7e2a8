pub mod game;
pub mod user;

pub use game::{BorrowStatus, Game, GameView, Owner};
pub use user::{User, UserView};
