//! Session state and the collaborator-facing surface

pub mod input;
pub mod session;
pub mod view;

pub use input::{spawn_stdin_reader, Command};
pub use session::Session;
pub use view::SceneSnapshot;
