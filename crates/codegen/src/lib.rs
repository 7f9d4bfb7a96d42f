pub mod shuffle;

pub use shuffle::{
    Action, Actions, SHUFFLE_STEP_CAP, ShuffleError, create_stack_layout, record_stack_layout,
};
