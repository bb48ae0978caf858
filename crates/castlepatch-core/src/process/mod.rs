//! Finding and starting the target game process.

mod finder;
mod launcher;

pub use finder::{ProcessEntry, find_target_process, list_processes};
pub use launcher::launch_game;
