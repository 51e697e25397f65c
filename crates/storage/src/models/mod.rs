mod game;
mod round;

pub use game::{GameType, ParseGameTypeError};
pub use round::{FILE_TIME_FORMAT, HistoryPoint, RoundRecord};
