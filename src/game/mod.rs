//! Replicated game state: maze, players and combat timing

pub mod engagement;
pub mod maze;
pub mod player;
pub mod world;

pub use engagement::{EngagementOutcome, Engagements, Phase};
pub use maze::{Direction, Maze, Pose};
pub use player::{Peek, PlayStatus, Player, PlayerId, NAME_LEN};
pub use world::{Removed, World};
