mod common;
mod master;
mod update_boards;

pub use common::{Args, execute};
