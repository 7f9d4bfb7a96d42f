pub mod slot;
pub mod stack;

pub use slot::{CallSiteId, StackSlot, VariableId};
pub use stack::Stack;

pub type U256 = primitive_types::U256;
