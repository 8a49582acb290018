//! Delayed kill and respawn
//!
//! Firing arms one engagement per visible target. When its deadline passes the
//! shot is confirmed only if the target is still in line of sight of where the
//! shooter stood when firing. A confirmed target stays down for one more
//! period and then comes back.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::player::{PlayStatus, PlayerId, MAX_PLAYERS};
use super::world::World;

/// Time between firing and the hit being decided, and between hit and respawn
pub const ENGAGEMENT_DELAY: Duration = Duration::from_millis(2000);

/// Where an engagement is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Shot in the air, waiting to see if it lands
    Pending,
    /// Target is down, waiting to respawn
    Confirmed,
}

/// Result of a deadline passing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementOutcome {
    /// Hit confirmed; the target is now dying
    Killed(PlayerId),
    /// Target moved out of the line of fire
    Missed(PlayerId),
    /// Dying target is back in play
    Respawned(PlayerId),
    /// Target or shooter no longer around
    Dropped(PlayerId),
}

#[derive(Debug, Clone, Copy)]
struct Engagement {
    phase: Phase,
    deadline: Instant,
}

/// Engagements keyed by target id
#[derive(Debug, Default)]
pub struct Engagements {
    slots: [Option<Engagement>; MAX_PLAYERS],
}

impl Engagements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the window for `target`. Dying targets and targets
    /// already confirmed are left alone.
    pub fn arm(&mut self, world: &World, target: PlayerId, now: Instant) -> bool {
        let slot = &mut self.slots[target.index()];
        if matches!(slot, Some(e) if e.phase == Phase::Confirmed) {
            return false;
        }
        if world.player(target).map_or(true, |player| player.is_dying()) {
            return false;
        }
        *slot = Some(Engagement {
            phase: Phase::Pending,
            deadline: now + ENGAGEMENT_DELAY,
        });
        debug!(target_id = %target, "Engagement armed");
        true
    }

    pub fn cancel(&mut self, target: PlayerId) {
        self.slots[target.index()] = None;
    }

    pub fn cancel_all(&mut self) {
        self.slots = Default::default();
    }

    pub fn phase(&self, target: PlayerId) -> Option<Phase> {
        self.slots[target.index()].map(|e| e.phase)
    }

    /// Earliest deadline still armed
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().map(|e| e.deadline).min()
    }

    /// Advance every engagement whose deadline is at or before `now`
    pub fn resolve_due(&mut self, world: &mut World, now: Instant) -> Vec<EngagementOutcome> {
        let mut outcomes = Vec::new();
        for index in 0..MAX_PLAYERS {
            let Some(engagement) = self.slots[index] else {
                continue;
            };
            if engagement.deadline > now {
                continue;
            }
            let Some(target) = PlayerId::new(index as u8 + 1) else {
                continue;
            };

            let outcome = Self::resolve(world, target);
            self.slots[index] = match outcome {
                EngagementOutcome::Killed(_) => Some(Engagement {
                    phase: Phase::Confirmed,
                    deadline: now + ENGAGEMENT_DELAY,
                }),
                _ => None,
            };
            debug!(target_id = %target, ?outcome, "Engagement resolved");
            outcomes.push(outcome);
        }
        outcomes
    }

    fn resolve(world: &mut World, target: PlayerId) -> EngagementOutcome {
        let Some(shooter) = world.local_id() else {
            return EngagementOutcome::Dropped(target);
        };
        let Some(status) = world.player(target).map(|player| player.status()) else {
            return EngagementOutcome::Dropped(target);
        };

        match status {
            PlayStatus::Active if world.could_see(shooter, target) => {
                world.record_kill(shooter, target);
                world.with_player_mut(target, |player, _| player.set_status(PlayStatus::Dying));
                EngagementOutcome::Killed(target)
            }
            PlayStatus::Active => EngagementOutcome::Missed(target),
            PlayStatus::Dying => {
                world.with_player_mut(target, |player, _| player.set_status(PlayStatus::Active));
                EngagementOutcome::Respawned(target)
            }
            PlayStatus::Inactive => EngagementOutcome::Dropped(target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::maze::{Direction, Maze, Pose};
    use crate::game::player::Player;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

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

    /// Local player 1 at (1,1) facing east, remote 2 at (4,1)
    fn duel() -> World {
        let mut world = World::new(Maze::parse(HALL).unwrap(), ChaCha8Rng::seed_from_u64(3));
        world.join_local(id(1), b"me", 0, 0).unwrap();
        world.with_local_mut(|player, _| player.set_pose(Pose::new(1, 1, Direction::East)));
        let mut bob = Player::announced(id(2), b"bob", 0, 0);
        bob.set_pose(Pose::new(4, 1, Direction::West));
        world.add_player(bob).unwrap();
        world
    }

    fn fire(world: &mut World, engagements: &mut Engagements, now: Instant) {
        for target in world.fire(id(1)) {
            engagements.arm(world, target, now);
        }
    }

    #[test]
    fn target_that_moves_away_is_missed() {
        let mut world = duel();
        let mut engagements = Engagements::new();
        let t0 = Instant::now();
        fire(&mut world, &mut engagements, t0);
        assert_eq!(engagements.phase(id(2)), Some(Phase::Pending));

        world.with_player_mut(id(2), |player, _| player.set_pose(Pose::new(5, 2, Direction::North)));
        let outcomes = engagements.resolve_due(&mut world, t0 + ENGAGEMENT_DELAY);
        assert_eq!(outcomes, vec![EngagementOutcome::Missed(id(2))]);
        assert!(engagements.next_deadline().is_none());
        assert_eq!(world.local().score(), 0);
        assert!(world.player(id(2)).unwrap().is_active());
    }

    #[test]
    fn visible_target_dies_then_respawns() {
        let mut world = duel();
        let mut engagements = Engagements::new();
        let t0 = Instant::now();
        fire(&mut world, &mut engagements, t0);

        // Nothing due yet
        let early = engagements.resolve_due(&mut world, t0 + Duration::from_millis(1999));
        assert!(early.is_empty());

        let t1 = t0 + ENGAGEMENT_DELAY;
        let outcomes = engagements.resolve_due(&mut world, t1);
        assert_eq!(outcomes, vec![EngagementOutcome::Killed(id(2))]);
        assert!(world.player(id(2)).unwrap().is_dying());
        assert_eq!(world.local().score(), 1);
        assert_eq!(world.player(id(2)).unwrap().deaths(), 1);
        assert_eq!(engagements.phase(id(2)), Some(Phase::Confirmed));
        assert_eq!(engagements.next_deadline(), Some(t1 + ENGAGEMENT_DELAY));

        let outcomes = engagements.resolve_due(&mut world, t1 + ENGAGEMENT_DELAY);
        assert_eq!(outcomes, vec![EngagementOutcome::Respawned(id(2))]);
        assert!(world.player(id(2)).unwrap().is_active());
        assert!(engagements.next_deadline().is_none());
    }

    #[test]
    fn shooter_moving_after_firing_still_hits() {
        let mut world = duel();
        let mut engagements = Engagements::new();
        let t0 = Instant::now();
        fire(&mut world, &mut engagements, t0);
        world.with_local_mut(|player, _| player.turn_left());

        let outcomes = engagements.resolve_due(&mut world, t0 + ENGAGEMENT_DELAY);
        assert_eq!(outcomes, vec![EngagementOutcome::Killed(id(2))]);
    }

    #[test]
    fn confirmed_and_dying_targets_are_not_rearmed() {
        let mut world = duel();
        let mut engagements = Engagements::new();
        let t0 = Instant::now();
        fire(&mut world, &mut engagements, t0);
        let t1 = t0 + ENGAGEMENT_DELAY;
        engagements.resolve_due(&mut world, t1);

        assert!(!engagements.arm(&world, id(2), t1));
        engagements.cancel(id(2));
        assert!(!engagements.arm(&world, id(2), t1));
    }

    #[test]
    fn firing_again_restarts_pending_window() {
        let mut world = duel();
        let mut engagements = Engagements::new();
        let t0 = Instant::now();
        fire(&mut world, &mut engagements, t0);
        let later = t0 + Duration::from_millis(500);
        fire(&mut world, &mut engagements, later);
        assert_eq!(engagements.next_deadline(), Some(later + ENGAGEMENT_DELAY));
    }

    #[test]
    fn departed_target_is_dropped() {
        let mut world = duel();
        let mut engagements = Engagements::new();
        let t0 = Instant::now();
        fire(&mut world, &mut engagements, t0);
        world.remove_player(id(2));

        let outcomes = engagements.resolve_due(&mut world, t0 + ENGAGEMENT_DELAY);
        assert_eq!(outcomes, vec![EngagementOutcome::Dropped(id(2))]);
        assert!(engagements.next_deadline().is_none());
    }
}
