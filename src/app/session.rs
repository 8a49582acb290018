//! Per-connection game session
//!
//! The session owns everything one connection needs: the world, the console,
//! the outbound queue and pending engagements. The event loop feeds it bytes,
//! commands and deadlines; every method reports whether the scene changed.

use bytes::{Buf, Bytes, BytesMut};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::input::Command;
use super::view::SceneSnapshot;
use crate::console::ConsoleBuffer;
use crate::game::{
    EngagementOutcome, Engagements, Maze, Player, PlayerId, PlayStatus, Removed, World,
    NAME_LEN,
};
use crate::net::outbound::{OutboundError, OutboundQueue};
use crate::net::protocol::{classify, decode, ByteClass, Frame, Relative};

/// Session state for one server connection
#[derive(Debug)]
pub struct Session {
    world: World,
    console: ConsoleBuffer,
    outbound: OutboundQueue,
    engagements: Engagements,
    status: String,
    /// Set once a leave has been queued; the loop ends when it is flushed
    exiting: bool,
}

impl Session {
    pub fn new(world: World) -> Self {
        Self {
            world,
            console: ConsoleBuffer::new(),
            outbound: OutboundQueue::new(),
            engagements: Engagements::new(),
            status: String::new(),
            exiting: false,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn console(&self) -> &ConsoleBuffer {
        &self.console
    }

    pub fn engagements(&self) -> &Engagements {
        &self.engagements
    }

    pub fn status_line(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot::capture(self)
    }

    /// Decode and apply every complete frame at the front of `inbound`,
    /// leaving a trailing partial frame for the next read.
    pub fn process_input(&mut self, inbound: &mut BytesMut) -> bool {
        let mut redraw = false;
        while let Some((frame, used)) = decode(inbound) {
            inbound.advance(used);
            redraw |= self.apply(frame);
        }
        redraw
    }

    /// Apply one inbound frame
    pub fn apply(&mut self, frame: Frame) -> bool {
        match frame {
            Frame::Leave { id } => self.on_leave(id),
            Frame::Move { id, pose } => {
                if self.world.is_local(id) {
                    return false;
                }
                self.with_visibility(id, |world| {
                    world.with_player_mut(id, |player, _| player.set_pose(pose));
                })
            }
            Frame::Kill { shooter, victim } => self.on_kill(shooter, victim),
            Frame::New {
                id,
                name,
                score,
                deaths,
            } => self.on_new(id, &name, score, deaths),
            Frame::Echo(ch) => {
                self.console.push(ch);
                true
            }
            Frame::Relative { id, action } => {
                if self.world.is_local(id) || self.world.player(id).is_none() {
                    return false;
                }
                self.with_visibility(id, |world| {
                    world.with_player_mut(id, |player, maze| apply_relative(player, maze, action));
                })
            }
            Frame::Ignored { tag } => {
                debug!(tag, "Ignored frame");
                false
            }
        }
    }

    /// Run `change` and report whether `id` was visible before or after it
    fn with_visibility(&mut self, id: PlayerId, change: impl FnOnce(&mut World)) -> bool {
        let before = self.visible(id);
        change(&mut self.world);
        before || self.visible(id)
    }

    fn visible(&self, id: PlayerId) -> bool {
        self.world
            .local_id()
            .map_or(false, |me| me != id && self.world.can_see(me, id))
    }

    fn on_leave(&mut self, id: PlayerId) -> bool {
        match self.world.remove_player(id) {
            None => false,
            Some(Removed::Local) => {
                info!(player_id = %id, "Server removed us");
                self.engagements.cancel_all();
                self.set_status("Removed from the game");
                self.request_exit();
                true
            }
            Some(Removed::Remote(player)) => {
                info!(player_id = %id, name = %player.display_name(), "Player left");
                self.engagements.cancel(id);
                true
            }
        }
    }

    fn on_kill(&mut self, shooter: PlayerId, victim: PlayerId) -> bool {
        self.world.record_kill(shooter, victim);
        if !self.world.is_local(victim) {
            return true;
        }

        let name = self.name_of(shooter);
        info!(shooter_id = %shooter, shooter = %name, "We were shot");
        self.set_status(format!("You were shot by {name}"));
        let pose = self.world.respawn_local();
        report(self.outbound.push_position(victim, pose));
        true
    }

    fn on_new(&mut self, id: PlayerId, name: &[u8; NAME_LEN], score: u32, deaths: u32) -> bool {
        let mut evicted_local = false;
        if let Some(existing) = self.world.player(id) {
            if existing.same_name(name) {
                self.world.with_player_mut(id, |player, _| {
                    player.set_score(score);
                    player.set_deaths(deaths);
                    player.set_status(PlayStatus::Active);
                });
                return true;
            }
            evicted_local = self.force_out(id);
        }

        // An evicted local player stays unassigned until the server says otherwise
        if self.world.local_id().is_none() && !evicted_local {
            if let Err(e) = self.world.join_local(id, name, score, deaths) {
                warn!(player_id = %id, error = %e, "Join rejected");
                return false;
            }
            let name = self.world.local().display_name();
            info!(player_id = %id, name = %name, "Joined");
            self.set_status(format!("Joined as {name}"));
            let pose = self.world.local().pose();
            report(self.outbound.push_position(id, pose));
        } else {
            let player = Player::announced(id, name, score, deaths);
            info!(player_id = %id, name = %player.display_name(), "Player joined");
            if let Err(e) = self.world.add_player(player) {
                warn!(player_id = %id, error = %e, "Announce rejected");
                return false;
            }
        }
        true
    }

    /// A different player took over `id`. True if that was us.
    fn force_out(&mut self, id: PlayerId) -> bool {
        if self.world.is_local(id) {
            warn!(player_id = %id, "Our slot was reassigned");
            self.world.release_local();
            self.engagements.cancel_all();
            true
        } else {
            self.world.remove_player(id);
            self.engagements.cancel(id);
            false
        }
    }

    /// Apply a local command
    pub fn handle_command(&mut self, command: Command, now: Instant) -> bool {
        debug!(?command, "Command");
        match command {
            Command::Forward(count) => self.step_local(Relative::Forward, count),
            Command::Backward(count) => self.step_local(Relative::Backward, count),
            Command::TurnLeft(count) => self.turn_local(Relative::TurnLeft, count),
            Command::TurnRight(count) => self.turn_local(Relative::TurnRight, count),
            Command::AboutFace => self.turn_local(Relative::TurnRight, 2),
            Command::PeekLeft => self.peek_local(
                |player, maze| player.peek_left(maze),
                &[Relative::Forward, Relative::TurnLeft],
            ),
            Command::PeekRight => self.peek_local(
                |player, maze| player.peek_right(maze),
                &[Relative::Forward, Relative::TurnRight],
            ),
            Command::UnpeekLeft => self.peek_local(
                |player, maze| player.unpeek_left(maze),
                &[Relative::TurnRight, Relative::Backward],
            ),
            Command::UnpeekRight => self.peek_local(
                |player, maze| player.unpeek_right(maze),
                &[Relative::TurnLeft, Relative::Backward],
            ),
            Command::Fire => self.fire(now),
            Command::Chat(text) => {
                self.chat(&text);
                false
            }
            Command::Quit => {
                self.request_exit();
                false
            }
        }
    }

    /// Joined and in play
    fn local_in_play(&self) -> Option<PlayerId> {
        self.world
            .local_id()
            .filter(|_| self.world.local().is_active() && !self.exiting)
    }

    fn turn_local(&mut self, action: Relative, count: usize) -> bool {
        let Some(id) = self.local_in_play() else {
            return false;
        };
        let turns = count % 4;
        if turns == 0 {
            return false;
        }
        let pose = self.world.with_local_mut(|player, _| {
            for _ in 0..turns {
                match action {
                    Relative::TurnLeft => player.turn_left(),
                    _ => player.turn_right(),
                };
            }
            player.pose()
        });
        report(self.outbound.push_turns(id, pose, action, turns));
        true
    }

    fn step_local(&mut self, action: Relative, count: usize) -> bool {
        let Some(id) = self.local_in_play() else {
            return false;
        };
        let (taken, pose) = self.world.with_local_mut(|player, maze| {
            let taken = (0..count)
                .take_while(|_| match action {
                    Relative::Backward => player.move_backward(maze),
                    _ => player.move_forward(maze),
                })
                .count();
            (taken, player.pose())
        });
        if taken == 0 {
            return false;
        }
        report(self.outbound.push_steps(id, pose, action, taken));
        true
    }

    fn peek_local(
        &mut self,
        change: impl FnOnce(&mut Player, &Maze) -> bool,
        wire: &[Relative],
    ) -> bool {
        let Some(id) = self.local_in_play() else {
            return false;
        };
        let (changed, pose) = self
            .world
            .with_local_mut(|player, maze| (change(player, maze), player.pose()));
        if !changed {
            return false;
        }
        report(self.outbound.push_sequence(id, pose, wire));
        true
    }

    /// Shoot along the current facing; hits are decided later
    pub fn fire(&mut self, now: Instant) -> bool {
        let Some(id) = self.local_in_play() else {
            return false;
        };
        let targets = self.world.fire(id);
        debug!(player_id = %id, targets = targets.len(), "Fired");
        for target in targets {
            self.engagements.arm(&self.world, target, now);
        }
        true
    }

    /// Send chat characters the console can show, folding lower case
    fn chat(&mut self, text: &str) {
        if self.world.local_id().is_none() || self.exiting {
            return;
        }
        for byte in text.bytes() {
            let Some(ch) = chat_byte(byte) else {
                debug!(byte, "Dropped chat character");
                continue;
            };
            if let Err(e) = self.outbound.push(&Frame::Echo(ch)) {
                warn!(error = %e, "Chat dropped");
                return;
            }
        }
    }

    /// Earliest engagement deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.engagements.next_deadline()
    }

    /// Resolve engagements that are due
    pub fn run_engagements(&mut self, now: Instant) -> bool {
        let outcomes = self.engagements.resolve_due(&mut self.world, now);
        let mut redraw = false;
        for outcome in outcomes {
            match outcome {
                EngagementOutcome::Killed(target) => {
                    let name = self.name_of(target);
                    info!(target_id = %target, target = %name, "Shot confirmed");
                    self.set_status(format!("You shot {name}"));
                    // The server has no use for a kill from a player who left
                    if let Some(me) = self.world.local_id().filter(|_| !self.exiting) {
                        report(self.outbound.push(&Frame::Kill {
                            shooter: me,
                            victim: target,
                        }));
                    }
                    redraw = true;
                }
                EngagementOutcome::Respawned(_) => redraw = true,
                EngagementOutcome::Missed(_) | EngagementOutcome::Dropped(_) => {}
            }
        }
        redraw
    }

    /// Queue a leave and wind down once it is flushed
    pub fn request_exit(&mut self) {
        if self.exiting {
            return;
        }
        self.exiting = true;
        if let Some(id) = self.world.local_id() {
            info!(player_id = %id, "Leaving");
            report(self.outbound.push(&Frame::Leave { id }));
        }
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    /// Exit requested and everything queued has been written
    pub fn exit_ready(&self) -> bool {
        self.exiting && self.outbound.is_idle()
    }

    /// Next chunk for the writer, if no flush is outstanding
    pub fn take_outbound(&mut self) -> Option<Bytes> {
        self.outbound.take()
    }

    pub fn flush_complete(&mut self) {
        self.outbound.complete_flush();
    }

    /// Connection is gone, gracefully or not
    pub fn disconnect(&mut self, reason: &str) {
        self.world.release_local();
        self.engagements.cancel_all();
        self.outbound.clear();
        self.exiting = false;
        self.set_status(reason);
    }

    fn name_of(&self, id: PlayerId) -> String {
        self.world
            .player(id)
            .map(Player::display_name)
            .unwrap_or_else(|| format!("player {id}"))
    }
}

fn report<T>(result: Result<T, OutboundError>) {
    if let Err(e) = result {
        warn!(error = %e, "Outbound update dropped");
    }
}

fn apply_relative(player: &mut Player, maze: &Maze, action: Relative) {
    match action {
        Relative::TurnRight => {
            player.turn_right();
        }
        Relative::TurnLeft => {
            player.turn_left();
        }
        Relative::AboutFace => {
            player.turn_right();
            player.turn_right();
        }
        Relative::Forward => {
            player.move_forward(maze);
        }
        Relative::Backward => {
            player.move_backward(maze);
        }
    }
}

/// Echo-class bytes go as-is; others with bit 6 set are tried in upper case
fn chat_byte(byte: u8) -> Option<u8> {
    if byte > 0x7f {
        return None;
    }
    if classify(byte) == ByteClass::Echo {
        return Some(byte);
    }
    let folded = byte & !0o40;
    (byte & 0o100 != 0 && classify(folded) == ByteClass::Echo).then_some(folded)
}
