//! Player registry and visibility over one maze

use rand_chacha::ChaCha8Rng;

use super::maze::{Maze, Pose};
use super::player::{PlayStatus, Player, PlayerId, MAX_PLAYERS};

/// Registry errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("player has no server id")]
    Unassigned,

    #[error("slot {0} is already taken")]
    SlotTaken(PlayerId),

    #[error("local player already joined as {0}")]
    AlreadyJoined(PlayerId),
}

/// What `remove_player` took out of the registry
#[derive(Debug)]
pub enum Removed {
    /// The local player; it keeps its id until `release_local`
    Local,
    Remote(Player),
}

#[derive(Debug, Clone)]
enum Slot {
    Empty,
    Local,
    Remote(Player),
}

/// Maze plus everyone in it
#[derive(Debug)]
pub struct World {
    maze: Maze,
    local: Player,
    slots: [Slot; MAX_PLAYERS],
    last_shooter: Option<PlayerId>,
    last_victim: Option<PlayerId>,
    rng: ChaCha8Rng,
}

impl World {
    /// New world with an unassigned local player already placed, so there is a
    /// view before the server answers the join.
    pub fn new(maze: Maze, rng: ChaCha8Rng) -> Self {
        let mut world = Self {
            maze,
            local: Player::new(),
            slots: std::array::from_fn(|_| Slot::Empty),
            last_shooter: None,
            last_victim: None,
            rng,
        };
        world.respawn_local();
        world
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    pub fn is_wall(&self, x: i32, y: i32) -> bool {
        self.maze.is_wall(x, y)
    }

    /// The viewpoint player, joined or not
    pub fn local(&self) -> &Player {
        &self.local
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        self.local.id()
    }

    pub fn is_local(&self, id: PlayerId) -> bool {
        matches!(self.slots[id.index()], Slot::Local)
    }

    /// Registered player by id
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        match &self.slots[id.index()] {
            Slot::Empty => None,
            Slot::Local => Some(&self.local),
            Slot::Remote(player) => Some(player),
        }
    }

    /// Run `f` on a registered player with the maze alongside
    pub fn with_player_mut<R>(
        &mut self,
        id: PlayerId,
        f: impl FnOnce(&mut Player, &Maze) -> R,
    ) -> Option<R> {
        let Self {
            maze, local, slots, ..
        } = self;
        let player = match &mut slots[id.index()] {
            Slot::Empty => return None,
            Slot::Local => local,
            Slot::Remote(player) => player,
        };
        Some(f(player, maze))
    }

    /// Run `f` on the local player whether or not it has joined
    pub fn with_local_mut<R>(&mut self, f: impl FnOnce(&mut Player, &Maze) -> R) -> R {
        f(&mut self.local, &self.maze)
    }

    /// Register a remote player under its own id
    pub fn add_player(&mut self, player: Player) -> Result<PlayerId, RegistryError> {
        let id = player.id().ok_or(RegistryError::Unassigned)?;
        let slot = &mut self.slots[id.index()];
        if !matches!(slot, Slot::Empty) {
            return Err(RegistryError::SlotTaken(id));
        }
        *slot = Slot::Remote(player);
        Ok(id)
    }

    /// Bind the local player to a server id
    pub fn join_local(
        &mut self,
        id: PlayerId,
        name: &[u8],
        score: u32,
        deaths: u32,
    ) -> Result<PlayerId, RegistryError> {
        if let Some(current) = self.local.id() {
            return Err(RegistryError::AlreadyJoined(current));
        }
        if !matches!(self.slots[id.index()], Slot::Empty) {
            return Err(RegistryError::SlotTaken(id));
        }
        self.local.assign(id, name, score, deaths);
        self.slots[id.index()] = Slot::Local;
        Ok(id)
    }

    /// Clear a slot and mark its player inactive. Empty slots are a no-op.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Removed> {
        match std::mem::replace(&mut self.slots[id.index()], Slot::Empty) {
            Slot::Empty => None,
            Slot::Local => {
                self.local.set_status(PlayStatus::Inactive);
                Some(Removed::Local)
            }
            Slot::Remote(mut player) => {
                player.set_status(PlayStatus::Inactive);
                Some(Removed::Remote(player))
            }
        }
    }

    /// Forget the local player's server identity
    pub fn release_local(&mut self) {
        if let Some(id) = self.local.id() {
            if self.is_local(id) {
                self.slots[id.index()] = Slot::Empty;
            }
        }
        self.local.release();
    }

    /// Place the local player on a random open cell
    pub fn respawn_local(&mut self) -> Pose {
        let pose = self.maze.random_open_pose(&mut self.rng);
        self.local.place(pose);
        pose
    }

    /// Place a registered player on a random open cell
    pub fn random_spawn(&mut self, id: PlayerId) -> Option<Pose> {
        let pose = self.maze.random_open_pose(&mut self.rng);
        self.with_player_mut(id, |player, _| player.place(pose))
            .map(|_| pose)
    }

    pub fn line_of_sight(&self, from: Pose, to: Pose) -> Option<i32> {
        self.maze.line_of_sight(from, to)
    }

    /// Both participating and `target` is ahead of `observer` with no wall between
    pub fn can_see(&self, observer: PlayerId, target: PlayerId) -> bool {
        self.sight(observer, target, Player::pose)
    }

    /// As `can_see`, but from where the observer last fired
    pub fn could_see(&self, observer: PlayerId, target: PlayerId) -> bool {
        self.sight(observer, target, Player::fire_position)
    }

    fn sight(&self, observer: PlayerId, target: PlayerId, from: fn(&Player) -> Pose) -> bool {
        let (Some(observer), Some(target)) = (self.player(observer), self.player(target)) else {
            return false;
        };
        observer.is_playing()
            && target.is_playing()
            && self.maze.line_of_sight(from(observer), target.pose()).is_some()
    }

    /// Score the shooter, charge the victim. False if either is unknown.
    pub fn record_kill(&mut self, shooter: PlayerId, victim: PlayerId) -> bool {
        if self.player(shooter).is_none() || self.player(victim).is_none() {
            return false;
        }
        self.with_player_mut(shooter, |player, _| player.bump_score());
        self.with_player_mut(victim, |player, _| player.bump_deaths());
        self.last_shooter = Some(shooter);
        self.last_victim = Some(victim);
        true
    }

    /// Snapshot the shooter's pose and list everyone it can see right now
    pub fn fire(&mut self, shooter: PlayerId) -> Vec<PlayerId> {
        if self
            .with_player_mut(shooter, |player, _| player.save_fire_position())
            .is_none()
        {
            return Vec::new();
        }
        self.ids()
            .filter(|&target| target != shooter && self.can_see(shooter, target))
            .collect()
    }

    /// First participating player standing on (x, y)
    pub fn player_at(&self, x: i32, y: i32) -> Option<&Player> {
        self.players().find(|player| {
            let pose = player.pose();
            pose.x == x && pose.y == y
        })
    }

    /// Ids of occupied slots
    pub fn ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !matches!(slot, Slot::Empty))
            .filter_map(|(index, _)| PlayerId::new(index as u8 + 1))
    }

    /// Participating players, local included once joined
    pub fn players(&self) -> impl Iterator<Item = &Player> + '_ {
        self.ids()
            .filter_map(|id| self.player(id))
            .filter(|player| player.is_playing())
    }

    pub fn last_shooter(&self) -> Option<PlayerId> {
        self.last_shooter
    }

    pub fn last_victim(&self) -> Option<PlayerId> {
        self.last_victim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::maze::Direction;
    use crate::game::player::Peek;
    use rand::SeedableRng;

    const HALL: &str = "\
#######
#     #
# ### #
#     #
#######
";

    fn id(raw: u8) -> PlayerId {
        PlayerId::new(raw).unwrap()
    }

    fn world() -> World {
        World::new(Maze::parse(HALL).unwrap(), ChaCha8Rng::seed_from_u64(1))
    }

    fn remote(world: &mut World, raw: u8, name: &[u8], pose: Pose) {
        let mut player = Player::announced(id(raw), name, 0, 0);
        player.set_pose(pose);
        world.add_player(player).unwrap();
    }

    fn join(world: &mut World, raw: u8, pose: Pose) {
        world.join_local(id(raw), b"me", 0, 0).unwrap();
        world.with_local_mut(|player, _| player.set_pose(pose));
    }

    #[test]
    fn local_is_placed_before_joining() {
        let world = world();
        let pose = world.local().pose();
        assert!(!world.is_wall(pose.x, pose.y));
        assert_eq!(world.local_id(), None);
        assert_eq!(world.players().count(), 0);
    }

    #[test]
    fn slots_reject_duplicates_and_unassigned() {
        let mut world = world();
        remote(&mut world, 2, b"bob", Pose::default());

        let dup = Player::announced(id(2), b"eve", 0, 0);
        assert_eq!(world.add_player(dup).unwrap_err(), RegistryError::SlotTaken(id(2)));
        assert_eq!(world.add_player(Player::new()).unwrap_err(), RegistryError::Unassigned);
        assert_eq!(
            world.join_local(id(2), b"me", 0, 0).unwrap_err(),
            RegistryError::SlotTaken(id(2))
        );

        world.join_local(id(1), b"me", 0, 0).unwrap();
        assert_eq!(
            world.join_local(id(3), b"me", 0, 0).unwrap_err(),
            RegistryError::AlreadyJoined(id(1))
        );
    }

    #[test]
    fn removing_twice_is_a_no_op() {
        let mut world = world();
        remote(&mut world, 4, b"bob", Pose::default());

        match world.remove_player(id(4)) {
            Some(Removed::Remote(player)) => assert_eq!(player.status(), PlayStatus::Inactive),
            other => panic!("unexpected {other:?}"),
        }
        assert!(world.remove_player(id(4)).is_none());
        assert!(world.player(id(4)).is_none());
    }

    #[test]
    fn removing_local_keeps_id_until_released() {
        let mut world = world();
        join(&mut world, 3, Pose::new(1, 1, Direction::East));

        assert!(matches!(world.remove_player(id(3)), Some(Removed::Local)));
        assert_eq!(world.local_id(), Some(id(3)));
        assert!(!world.local().is_playing());

        world.release_local();
        assert_eq!(world.local_id(), None);
    }

    #[test]
    fn wall_between_flips_can_see() {
        let mut world = world();
        join(&mut world, 1, Pose::new(1, 1, Direction::South));
        remote(&mut world, 2, b"bob", Pose::new(1, 3, Direction::North));
        assert!(world.can_see(id(1), id(2)));
        assert!(world.can_see(id(2), id(1)));

        world.with_local_mut(|player, _| player.set_pose(Pose::new(3, 1, Direction::South)));
        world.with_player_mut(id(2), |player, _| player.set_pose(Pose::new(3, 3, Direction::North)));
        assert!(!world.can_see(id(1), id(2)));
    }

    /// HALL with one extra wall at (x, y)
    fn hall_with_wall(x: usize, y: usize) -> String {
        HALL.lines()
            .enumerate()
            .map(|(row, line)| {
                let mut line = line.to_string();
                if row == y {
                    line.replace_range(x..=x, "#");
                }
                line + "\n"
            })
            .collect()
    }

    fn pair_in(layout: &str, observer: Pose, target: Pose) -> World {
        let mut world = World::new(Maze::parse(layout).unwrap(), ChaCha8Rng::seed_from_u64(1));
        join(&mut world, 1, observer);
        remote(&mut world, 2, b"bob", target);
        world
    }

    #[test]
    fn inserted_wall_on_sight_line_blocks_can_see() {
        let lines = [
            // along the top corridor
            (
                Pose::new(1, 1, Direction::East),
                Pose::new(5, 1, Direction::West),
                vec![(2, 1), (3, 1), (4, 1)],
            ),
            // down the left column
            (
                Pose::new(1, 1, Direction::South),
                Pose::new(1, 3, Direction::North),
                vec![(1, 2)],
            ),
        ];
        for (observer, target, between) in lines {
            assert!(pair_in(HALL, observer, target).can_see(id(1), id(2)));
            for (x, y) in between {
                let world = pair_in(&hall_with_wall(x, y), observer, target);
                assert!(world.is_wall(x as i32, y as i32));
                assert!(!world.can_see(id(1), id(2)), "wall at ({x}, {y})");
            }
        }
    }

    #[test]
    fn respawn_clears_peek() {
        let mut world = world();
        join(&mut world, 1, Pose::new(1, 1, Direction::South));
        assert!(world.with_local_mut(|player, maze| player.peek_left(maze)));

        let pose = world.respawn_local();
        assert_eq!(world.local().pose(), pose);
        assert_eq!(world.local().peek(), Peek::None);
    }

    #[test]
    fn inactive_players_are_invisible() {
        let mut world = world();
        join(&mut world, 1, Pose::new(1, 1, Direction::East));
        remote(&mut world, 2, b"bob", Pose::new(4, 1, Direction::West));
        world.with_player_mut(id(2), |player, _| player.set_status(PlayStatus::Inactive));
        assert!(!world.can_see(id(1), id(2)));
    }

    #[test]
    fn fire_lists_visible_targets_and_snapshots_pose() {
        let mut world = world();
        join(&mut world, 1, Pose::new(1, 1, Direction::East));
        remote(&mut world, 2, b"bob", Pose::new(4, 1, Direction::West));
        remote(&mut world, 3, b"eve", Pose::new(1, 3, Direction::North));

        assert_eq!(world.fire(id(1)), vec![id(2)]);

        assert!(world.with_local_mut(|player, maze| player.move_forward(maze)));
        assert!(world.could_see(id(1), id(2)));
        assert_eq!(world.local().fire_position(), Pose::new(1, 1, Direction::East));
    }

    #[test]
    fn record_kill_updates_both_sides() {
        let mut world = world();
        join(&mut world, 1, Pose::new(1, 1, Direction::East));
        remote(&mut world, 2, b"bob", Pose::new(4, 1, Direction::West));

        assert!(world.record_kill(id(2), id(1)));
        assert_eq!(world.player(id(2)).unwrap().score(), 1);
        assert_eq!(world.local().deaths(), 1);
        assert_eq!(world.last_shooter(), Some(id(2)));
        assert_eq!(world.last_victim(), Some(id(1)));

        assert!(!world.record_kill(id(5), id(1)));
    }

    #[test]
    fn random_spawn_lands_on_open_cell() {
        let mut world = world();
        remote(&mut world, 5, b"bob", Pose::default());
        let pose = world.random_spawn(id(5)).unwrap();
        assert!(!world.is_wall(pose.x, pose.y));
        assert_eq!(world.player(id(5)).unwrap().pose(), pose);
        assert!(world.random_spawn(id(6)).is_none());
    }

    #[test]
    fn player_at_finds_occupant() {
        let mut world = world();
        remote(&mut world, 6, b"bob", Pose::new(5, 3, Direction::West));
        assert_eq!(world.player_at(5, 3).and_then(Player::id), Some(id(6)));
        assert!(world.player_at(4, 3).is_none());
    }
}
