//! Stack layout shuffling.
//!
//! Given a *current* operand stack layout and a *target* layout,
//! [`create_stack_layout`] emits a sequence of the machine's three layout
//! primitives (swap-with-depth, pop, push-or-dup) that transforms the
//! current layout into one compatible with the target, invoking a caller
//! hook for every primitive and mutating `current` in lock-step.
//!
//! - A slot is *compatible* with a target position when the two slots are
//!   identical or the target slot is [`StackSlot::Junk`].
//! - The shuffler loop performs exactly one primitive per step, driven by
//!   per-slot multiplicities (how many more or fewer copies the target
//!   wants); the case analysis lives in the `shuffler` submodule.
//! - Once every existing position is compatible, the remaining target
//!   suffix is pushed and junk positions are canonicalized to
//!   [`StackSlot::Junk`].
//!
//! Callers must pre-validate that every depth the shuffler may ask for is
//! physically reachable on the machine; the transformer itself places no
//! bound on swap depth.

mod ops;
mod shuffler;

use core::fmt;
use std::cell::RefCell;

use lamina_ir::{Stack, StackSlot};
use smallvec::SmallVec;
use thiserror::Error;

/// Iteration guard for the shuffle loop. The loop terminates in polynomial
/// steps on valid inputs; hitting the cap means a broken adapter, not an
/// input problem.
pub const SHUFFLE_STEP_CAP: usize = 1000;

/// Failure of the shuffle itself. Both kinds are programmer errors: they
/// indicate a broken adapter contract or an inconsistency between the
/// current and target layouts, never a recoverable condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShuffleError {
    #[error("stack shuffle still incomplete after {steps} steps")]
    NonTermination { steps: usize },

    #[error("stack shuffle invariant violated: {0}")]
    InvariantViolation(&'static str),
}

/// Transforms `current` into a layout compatible with `target`, invoking
/// the provided hooks for every emitted primitive.
///
/// Hook contract:
/// - `swap(depth)` emits the machine's swap-with-depth instruction
///   (`depth >= 1`);
/// - `push_or_dup(slot)` emits an instruction that places a value
///   compatible with `slot` on top, by dup, literal push, label push, or
///   whatever the emitter prefers;
/// - `pop()` emits the drop-top instruction.
///
/// Hooks are infallible within this contract; an emitter that needs to
/// fail must record the failure out-of-band. On success `current` has the
/// target's length and every position holds the target slot, with
/// [`StackSlot::Junk`] at positions the target leaves arbitrary.
pub fn create_stack_layout<Swap, PushOrDup, Pop>(
    current: &mut Stack,
    target: &Stack,
    mut swap: Swap,
    mut push_or_dup: PushOrDup,
    mut pop: Pop,
) -> Result<(), ShuffleError>
where
    Swap: FnMut(u32),
    PushOrDup: FnMut(StackSlot),
    Pop: FnMut(),
{
    shuffler::shuffle(current, target, &mut swap, &mut push_or_dup, &mut pop)?;

    // All existing positions are compatible now; the target may still be
    // longer.
    while current.len() < target.len() {
        let slot = target[current.len()];
        push_or_dup(slot);
        current.push(slot);
    }

    if current.len() != target.len() {
        return Err(ShuffleError::InvariantViolation(
            "layout size mismatch after shuffle",
        ));
    }
    for offset in 0..target.len() {
        if target[offset].is_junk() {
            current[offset] = StackSlot::Junk;
        } else if current[offset] != target[offset] {
            return Err(ShuffleError::InvariantViolation(
                "slot mismatch after shuffle",
            ));
        }
    }

    Ok(())
}

/// One emitted layout primitive.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    StackSwap(u32),
    PushOrDup(StackSlot),
    Pop,
}

pub type Actions = SmallVec<[Action; 8]>;

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackSwap(depth) => write!(f, "SWAP{depth}"),
            Self::PushOrDup(slot) => write!(f, "PUSH_OR_DUP({slot})"),
            Self::Pop => write!(f, "POP"),
        }
    }
}

/// [`create_stack_layout`] with recording hooks: returns the emitted
/// primitive sequence instead of dispatching to an emitter.
pub fn record_stack_layout(
    current: &mut Stack,
    target: &Stack,
) -> Result<Actions, ShuffleError> {
    let actions = RefCell::new(Actions::new());
    create_stack_layout(
        current,
        target,
        |depth| actions.borrow_mut().push(Action::StackSwap(depth)),
        |slot| actions.borrow_mut().push(Action::PushOrDup(slot)),
        || actions.borrow_mut().push(Action::Pop),
    )?;
    Ok(actions.into_inner())
}
