pub mod bulk;
pub mod history;
pub mod moves;
pub mod persistence;
pub mod rules;
pub mod state;
pub mod store;
pub mod tags;
pub mod validate;

pub use bulk::*;
pub use history::*;
pub use moves::*;
pub use persistence::*;
pub use rules::*;
pub use state::*;
pub use store::*;
pub use tags::*;
pub use validate::*;
