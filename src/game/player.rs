//! Player entity: pose, status, peeking and the fire snapshot

use std::fmt;

use serde::Serialize;

use super::maze::{Direction, Maze, Pose};

/// Maximum players in one maze
pub const MAX_PLAYERS: usize = 8;
/// Names are a fixed, space-padded field
pub const NAME_LEN: usize = 6;

/// Server-assigned player id, 1 through 8
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PlayerId(u8);

impl PlayerId {
    /// Validate a raw id byte; 0 is never a valid id
    pub fn new(raw: u8) -> Option<Self> {
        (1..=MAX_PLAYERS as u8).contains(&raw).then_some(Self(raw))
    }

    /// Id packed into the low three bits of a one-byte relative command
    pub fn from_low_bits(tag: u8) -> Self {
        Self((tag & 7) + 1)
    }

    /// Low three bits used when packing this id into a command byte
    pub fn low_bits(self) -> u8 {
        (self.0 - 1) & 7
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Registry slot index
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Participation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayStatus {
    Inactive,
    Active,
    /// Hit, waiting out the respawn delay
    Dying,
}

/// Peek state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Peek {
    #[default]
    None,
    Left,
    Right,
}

/// One player in the maze
#[derive(Debug, Clone)]
pub struct Player {
    id: Option<PlayerId>,
    name: [u8; NAME_LEN],
    status: PlayStatus,
    pose: Pose,
    peek: Peek,
    score: u32,
    deaths: u32,
    /// Pose at the moment of the last shot
    fire_pose: Pose,
}

impl Player {
    pub fn new() -> Self {
        Self {
            id: None,
            name: [b' '; NAME_LEN],
            status: PlayStatus::Inactive,
            pose: Pose::default(),
            peek: Peek::None,
            score: 0,
            deaths: 0,
            fire_pose: Pose::default(),
        }
    }

    /// A player announced by the server
    pub fn announced(id: PlayerId, name: &[u8], score: u32, deaths: u32) -> Self {
        let mut player = Self::new();
        player.assign(id, name, score, deaths);
        player
    }

    /// Take on a server identity and become active
    pub fn assign(&mut self, id: PlayerId, name: &[u8], score: u32, deaths: u32) {
        self.id = Some(id);
        self.set_name(name);
        self.score = score;
        self.deaths = deaths;
        self.status = PlayStatus::Active;
    }

    /// Drop the server identity
    pub fn release(&mut self) {
        self.id = None;
        self.status = PlayStatus::Inactive;
        self.peek = Peek::None;
    }

    pub fn id(&self) -> Option<PlayerId> {
        self.id
    }

    /// Name without the padding
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).trim_end().to_string()
    }

    /// Copy up to six bytes, padding with spaces
    pub fn set_name(&mut self, name: &[u8]) {
        self.name = [b' '; NAME_LEN];
        for (dst, src) in self.name.iter_mut().zip(name) {
            *dst = src & 0x7f;
        }
    }

    pub fn same_name(&self, name: &[u8]) -> bool {
        let mut other = [b' '; NAME_LEN];
        for (dst, src) in other.iter_mut().zip(name) {
            *dst = src & 0x7f;
        }
        self.name == other
    }

    pub fn status(&self) -> PlayStatus {
        self.status
    }

    pub fn set_status(&mut self, status: PlayStatus) {
        self.status = status;
    }

    /// Anything but inactive takes part in sight checks
    pub fn is_playing(&self) -> bool {
        self.status != PlayStatus::Inactive
    }

    pub fn is_active(&self) -> bool {
        self.status == PlayStatus::Active
    }

    pub fn is_dying(&self) -> bool {
        self.status == PlayStatus::Dying
    }

    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Put the player down at `pose`, no longer peeking
    pub fn place(&mut self, pose: Pose) {
        self.pose = pose;
        self.peek = Peek::None;
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    pub fn peek(&self) -> Peek {
        self.peek
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn deaths(&self) -> u32 {
        self.deaths
    }

    pub fn set_score(&mut self, score: u32) {
        self.score = score;
    }

    pub fn set_deaths(&mut self, deaths: u32) {
        self.deaths = deaths;
    }

    pub fn bump_score(&mut self) -> u32 {
        self.score += 1;
        self.score
    }

    pub fn bump_deaths(&mut self) -> u32 {
        self.deaths += 1;
        self.deaths
    }

    pub fn turn_left(&mut self) -> Direction {
        self.pose.dir = self.pose.dir.left();
        self.pose.dir
    }

    pub fn turn_right(&mut self) -> Direction {
        self.pose.dir = self.pose.dir.right();
        self.pose.dir
    }

    pub fn move_forward(&mut self, maze: &Maze) -> bool {
        self.step(maze, self.pose.dir)
    }

    pub fn move_backward(&mut self, maze: &Maze) -> bool {
        self.step(maze, self.pose.dir.reverse())
    }

    fn step(&mut self, maze: &Maze, dir: Direction) -> bool {
        let (x, y) = self.pose.step(dir);
        if maze.is_wall(x, y) {
            return false;
        }
        self.pose.x = x;
        self.pose.y = y;
        true
    }

    /// Step forward and look right
    pub fn peek_right(&mut self, maze: &Maze) -> bool {
        if self.peek != Peek::None || !self.move_forward(maze) {
            return false;
        }
        self.turn_right();
        self.peek = Peek::Right;
        true
    }

    /// Step forward and look left
    pub fn peek_left(&mut self, maze: &Maze) -> bool {
        if self.peek != Peek::None || !self.move_forward(maze) {
            return false;
        }
        self.turn_left();
        self.peek = Peek::Left;
        true
    }

    /// Undo `peek_right`. If the cell behind is no longer free the player keeps
    /// looking right, but the peek is cleared either way.
    pub fn unpeek_right(&mut self, maze: &Maze) -> bool {
        if self.peek != Peek::Right {
            return false;
        }
        self.turn_left();
        if !self.move_backward(maze) {
            self.turn_right();
        }
        self.peek = Peek::None;
        true
    }

    /// Undo `peek_left`, with the same fallback as `unpeek_right`
    pub fn unpeek_left(&mut self, maze: &Maze) -> bool {
        if self.peek != Peek::Left {
            return false;
        }
        self.turn_right();
        if !self.move_backward(maze) {
            self.turn_left();
        }
        self.peek = Peek::None;
        true
    }

    pub fn save_fire_position(&mut self) {
        self.fire_pose = self.pose;
    }

    pub fn fire_position(&self) -> Pose {
        self.fire_pose
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Corner at (1,1): corridor east along row 1 and south along column 1
    const CORNER: &str = "\
#####
#   #
# ###
# ###
#####
";

    fn player_at(x: i32, y: i32, dir: Direction) -> Player {
        let mut player = Player::new();
        player.set_pose(Pose::new(x, y, dir));
        player
    }

    #[test]
    fn ids_pack_into_low_bits() {
        assert!(PlayerId::new(0).is_none());
        assert!(PlayerId::new(9).is_none());
        let eight = PlayerId::new(8).unwrap();
        assert_eq!(eight.low_bits(), 7);
        assert_eq!(PlayerId::from_low_bits(0o27), eight);
        assert_eq!(PlayerId::from_low_bits(0o150).get(), 1);
    }

    #[test]
    fn moves_are_blocked_by_walls() {
        let maze = Maze::parse(CORNER).unwrap();
        let mut player = player_at(1, 1, Direction::North);
        assert!(!player.move_forward(&maze));
        assert_eq!(player.pose(), Pose::new(1, 1, Direction::North));

        assert!(player.move_backward(&maze));
        assert_eq!(player.pose(), Pose::new(1, 2, Direction::North));
    }

    #[test]
    fn peek_and_unpeek_are_inverse() {
        let maze = Maze::parse(CORNER).unwrap();
        let mut player = player_at(1, 2, Direction::North);

        assert!(player.peek_right(&maze));
        assert_eq!(player.pose(), Pose::new(1, 1, Direction::East));
        assert_eq!(player.peek(), Peek::Right);

        // Already peeking
        assert!(!player.peek_left(&maze));
        assert!(!player.unpeek_left(&maze));

        assert!(player.unpeek_right(&maze));
        assert_eq!(player.pose(), Pose::new(1, 2, Direction::North));
        assert_eq!(player.peek(), Peek::None);
    }

    #[test]
    fn peek_fails_without_room_ahead() {
        let maze = Maze::parse(CORNER).unwrap();
        let mut player = player_at(1, 1, Direction::West);
        assert!(!player.peek_left(&maze));
        assert_eq!(player.pose(), Pose::new(1, 1, Direction::West));
        assert_eq!(player.peek(), Peek::None);
    }

    #[test]
    fn unpeek_never_sticks_when_blocked() {
        let maze = Maze::parse(CORNER).unwrap();
        let mut player = player_at(2, 1, Direction::West);
        assert!(player.peek_left(&maze));
        assert_eq!(player.pose(), Pose::new(1, 1, Direction::South));

        // Pretend the cell we came from filled in: teleport to a dead end
        player.set_pose(Pose::new(3, 1, Direction::South));
        assert!(player.unpeek_left(&maze));
        assert_eq!(player.peek(), Peek::None);
        assert_eq!(player.pose(), Pose::new(3, 1, Direction::South));
    }

    #[test]
    fn names_are_padded_and_compared() {
        let mut player = Player::new();
        player.set_name(b"bob");
        assert_eq!(&player.name, b"bob   ");
        assert!(player.same_name(b"bob   "));
        assert!(player.same_name(b"bob"));
        assert!(!player.same_name(b"alice "));
        assert_eq!(player.display_name(), "bob");
    }

    #[test]
    fn fire_snapshot_is_independent_of_later_moves() {
        let maze = Maze::parse(CORNER).unwrap();
        let mut player = player_at(1, 1, Direction::East);
        player.save_fire_position();
        assert!(player.move_forward(&maze));
        assert_eq!(player.fire_position(), Pose::new(1, 1, Direction::East));
    }
}
