pub mod protocol;
pub mod entities;
pub mod grid;

pub use protocol::*;
pub use entities::*;
pub use grid::*;
