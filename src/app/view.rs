//! Scene snapshots handed to the renderer

use serde::Serialize;

use super::session::Session;
use crate::game::{Direction, Peek, Phase, PlayStatus, Player, PlayerId, World};

/// One player as the renderer sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerView {
    pub id: Option<PlayerId>,
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub dir: Direction,
    pub status: PlayStatus,
    pub peek: Peek,
    pub score: u32,
    pub deaths: u32,
    /// In line of sight of the viewpoint
    pub visible: bool,
    /// Cells ahead of the viewpoint, when visible
    pub distance: Option<i32>,
    /// Our shot at this player, if one is outstanding
    pub engagement: Option<Phase>,
}

impl PlayerView {
    fn new(player: &Player) -> Self {
        let pose = player.pose();
        Self {
            id: player.id(),
            name: player.display_name(),
            x: pose.x,
            y: pose.y,
            dir: pose.dir,
            status: player.status(),
            peek: player.peek(),
            score: player.score(),
            deaths: player.deaths(),
            visible: false,
            distance: None,
            engagement: None,
        }
    }
}

/// The maze as text rows: `#` for a wall, a digit for the player standing
/// there, blank for open floor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MazeView {
    pub width: i32,
    pub height: i32,
    pub rows: Vec<String>,
}

impl MazeView {
    fn capture(world: &World) -> Self {
        let (width, height) = (world.maze().width(), world.maze().height());
        let rows = (0..height)
            .map(|y| (0..width).map(|x| cell(world, x, y)).collect())
            .collect();
        Self {
            width,
            height,
            rows,
        }
    }
}

fn cell(world: &World, x: i32, y: i32) -> char {
    if world.is_wall(x, y) {
        return '#';
    }
    match world.player_at(x, y).and_then(Player::id) {
        Some(id) => char::from(b'0' + id.get()),
        None => ' ',
    }
}

/// Everything needed to draw one frame
#[derive(Debug, Clone, Serialize)]
pub struct SceneSnapshot {
    pub maze: MazeView,
    pub viewpoint: PlayerView,
    /// Participating players, the viewpoint included once joined
    pub players: Vec<PlayerView>,
    pub console: String,
    pub status: String,
    /// A leave has been queued
    pub leaving: bool,
    pub last_shooter: Option<PlayerId>,
    pub last_victim: Option<PlayerId>,
}

impl SceneSnapshot {
    pub fn capture(session: &Session) -> Self {
        let world = session.world();
        let local = world.local();
        let players = world
            .players()
            .map(|player| {
                let mut view = PlayerView::new(player);
                if let (Some(me), Some(them)) = (local.id(), player.id()) {
                    if me != them && world.can_see(me, them) {
                        view.visible = true;
                        view.distance = world.line_of_sight(local.pose(), player.pose());
                    }
                    view.engagement = session.engagements().phase(them);
                }
                view
            })
            .collect();

        Self {
            maze: MazeView::capture(world),
            viewpoint: PlayerView::new(local),
            players,
            console: session.console().text().to_string(),
            status: session.status_line().to_string(),
            leaving: session.is_exiting(),
            last_shooter: world.last_shooter(),
            last_victim: world.last_victim(),
        }
    }
}
