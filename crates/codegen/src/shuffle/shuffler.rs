//! The shuffle step loop.
//!
//! Each step performs exactly one layout primitive, chosen by the first
//! matching clause of a fixed case analysis. Every clause strictly
//! decreases a lexicographic measure (surplus copies, then out-of-position
//! slots, then size gap), so the loop terminates without backtracking;
//! [`SHUFFLE_STEP_CAP`] is a guard against adapter bugs, not part of the
//! algorithm.

use std::collections::VecDeque;

use lamina_ir::{Stack, StackSlot};
use rustc_hash::FxHashSet;

use super::{
    SHUFFLE_STEP_CAP, ShuffleError,
    ops::{LayoutOps, ShuffleOps},
};

macro_rules! ensure {
    ($cond:expr, $what:literal) => {
        if !$cond {
            return Err(ShuffleError::InvariantViolation($what));
        }
    };
}

/// Runs shuffle steps until every source position is compatible with the
/// target. A fresh adapter (and thus a fresh multiplicity table) is built
/// per step, keeping the table a pure function of the live layouts.
///
/// On return the target may still be longer than the source; the caller
/// pushes the remaining suffix.
pub(super) fn shuffle<Swap, PushOrDup, Pop>(
    current: &mut Stack,
    target: &Stack,
    swap: &mut Swap,
    push_or_dup: &mut PushOrDup,
    pop: &mut Pop,
) -> Result<(), ShuffleError>
where
    Swap: FnMut(u32),
    PushOrDup: FnMut(StackSlot),
    Pop: FnMut(),
{
    for _ in 0..SHUFFLE_STEP_CAP {
        let mut ops = LayoutOps::new(current, target, swap, push_or_dup, pop);
        if !step(&mut ops)? {
            return Ok(());
        }
    }
    Err(ShuffleError::NonTermination {
        steps: SHUFFLE_STEP_CAP,
    })
}

/// Performs a single primitive, moving the source layout closer to the
/// target. Returns `false` once all source slots are compatible with the
/// slots at the same target offset.
fn step<O: ShuffleOps>(ops: &mut O) -> Result<bool, ShuffleError> {
    // Done once every source position is compatible with the target. The
    // target may still have more slots than the source.
    if (0..ops.source_size()).all(|offset| ops.is_compatible(offset, offset)) {
        return Ok(false);
    }

    let source_top = ops.source_size() - 1;

    // A surplus top is dropped, unless the target wants an arbitrary slot
    // at this position.
    if ops.source_multiplicity(source_top) < 0
        && !(ops.target_size() >= ops.source_size() && ops.target_is_arbitrary(source_top))
    {
        ops.pop();
        return Ok(true);
    }

    ensure!(ops.target_size() > 0, "empty target with incompatible source");

    // If the top is not supposed to stay where it is, try to sink it to a
    // lower position that wants it.
    if !ops.is_compatible(source_top, source_top) || ops.target_is_arbitrary(source_top) {
        for offset in 0..ops.source_size().min(ops.target_size()) {
            // Sinking makes sense if the lower slot is out of position,
            // the swap would not exchange identical slots, and the lower
            // position wants the current top.
            if !ops.is_compatible(offset, offset)
                && !ops.source_is_same(offset, source_top)
                && ops.is_compatible(source_top, offset)
            {
                ops.swap(ops.source_size() - offset - 1);
                return Ok(true);
            }
        }
    }

    // If a lower slot should be removed, materialize the slot that belongs
    // at its position instead. The cases above guarantee a push or dup
    // source exists here.
    for offset in 0..ops.source_size() {
        if !ops.is_compatible(offset, offset)
            && ops.source_multiplicity(offset) < 0
            && offset <= ops.target_size()
            && !ops.target_is_arbitrary(offset)
        {
            bring_up_target_slot(ops, offset)?;
            return Ok(true);
        }
    }

    // From here on every slot is wanted.
    for offset in 0..ops.source_size() {
        ensure!(
            ops.source_multiplicity(offset) >= 0,
            "surplus slot survived the removal cases"
        );
    }
    ensure!(
        ops.source_size() <= ops.target_size(),
        "source deeper than target with no surplus"
    );

    // The top is out of position; raise a slot that wants to be on top.
    if !ops.is_compatible(source_top, source_top) {
        for offset in 0..ops.source_size() {
            if !ops.is_compatible(offset, offset) && ops.is_compatible(offset, source_top) {
                ops.swap(ops.source_size() - offset - 1);
                return Ok(true);
            }
        }
    }

    // Still short of the target; grow the stack.
    if ops.source_size() < ops.target_size() {
        bring_up_target_slot(ops, ops.source_size())?;
        return Ok(true);
    }

    // The sizes match, every slot has the right number of copies, and the
    // top is in position; only lower slots remain to be swapped around.
    let size = ops.source_size();
    ensure!(size == ops.target_size(), "size mismatch in the swap cases");
    for offset in 0..size {
        ensure!(
            ops.source_multiplicity(offset) == 0
                && (ops.target_is_arbitrary(offset) || ops.target_multiplicity(offset) == 0),
            "unsettled multiplicity in the swap cases"
        );
    }
    ensure!(
        ops.is_compatible(source_top, source_top),
        "top out of position in the swap cases"
    );

    // Prefer a lower out-of-position slot the current top can settle into.
    for offset in 0..size {
        if !ops.is_compatible(offset, offset) && ops.is_compatible(source_top, offset) {
            ops.swap(size - offset - 1);
            return Ok(true);
        }
    }
    // Otherwise swap up any slot that is still out of position.
    for offset in 0..size {
        if !ops.is_compatible(offset, offset) && !ops.source_is_same(offset, source_top) {
            ops.swap(size - offset - 1);
            return Ok(true);
        }
    }

    Err(ShuffleError::InvariantViolation(
        "no progress-making primitive",
    ))
}

/// Materializes a slot compatible with `target[target_offset]` as the new
/// top.
///
/// Breadth-first walk over offsets: if the slot wanted at the visited
/// offset still needs copies, push or dup it; otherwise every wanted copy
/// already sits somewhere on the stack, and the positions holding them are
/// enqueued. The step-decision preconditions guarantee some branch
/// succeeds; exhaustion means the adapter contract is broken.
fn bring_up_target_slot<O: ShuffleOps>(
    ops: &mut O,
    target_offset: usize,
) -> Result<(), ShuffleError> {
    let mut to_visit = VecDeque::from([target_offset]);
    let mut visited = FxHashSet::default();

    while let Some(offset) = to_visit.pop_front() {
        visited.insert(offset);
        if ops.target_multiplicity(offset) > 0 {
            ops.push_or_dup_target(offset);
            return Ok(());
        }
        // The wanted slot has no free copies, so it currently occupies
        // some other position.
        for next in 0..ops.source_size().min(ops.target_size()) {
            if !ops.is_compatible(next, next)
                && ops.is_compatible(next, offset)
                && !visited.contains(&next)
            {
                to_visit.push_back(next);
            }
        }
    }

    Err(ShuffleError::InvariantViolation(
        "no reachable push or dup source",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_ir::VariableId;
    use std::cell::Cell;

    fn var(n: u32) -> StackSlot {
        StackSlot::Var(VariableId(n))
    }

    fn stack(slots: &[StackSlot]) -> Stack {
        slots.iter().copied().collect()
    }

    /// Every step that reports progress emits exactly one primitive; the
    /// final step emits none.
    #[test]
    fn one_primitive_per_step() {
        let mut current = stack(&[var(0), var(1), var(2), var(0)]);
        let target = stack(&[var(2), var(1), StackSlot::Junk, var(1)]);

        let emitted = Cell::new(0usize);
        let mut swap = |_: u32| emitted.set(emitted.get() + 1);
        let mut push_or_dup = |_: StackSlot| emitted.set(emitted.get() + 1);
        let mut pop = || emitted.set(emitted.get() + 1);

        for _ in 0..SHUFFLE_STEP_CAP {
            emitted.set(0);
            let mut ops =
                LayoutOps::new(&mut current, &target, &mut swap, &mut push_or_dup, &mut pop);
            let progressed = step(&mut ops).unwrap();
            if !progressed {
                assert_eq!(emitted.get(), 0);
                return;
            }
            assert_eq!(emitted.get(), 1);
        }
        panic!("shuffle did not settle within the step cap");
    }

    #[test]
    fn settled_layout_reports_no_work() {
        let mut current = stack(&[var(0), var(1)]);
        let target = stack(&[var(0), var(1), var(2)]);

        let mut swap = |_: u32| panic!("no primitive expected");
        let mut push_or_dup = |_: StackSlot| panic!("no primitive expected");
        let mut pop = || panic!("no primitive expected");
        let mut ops =
            LayoutOps::new(&mut current, &target, &mut swap, &mut push_or_dup, &mut pop);

        // All source positions are compatible; the missing third slot is
        // the tail's business, not the shuffler's.
        assert!(!step(&mut ops).unwrap());
    }

    #[test]
    fn surplus_top_is_popped() {
        let mut current = stack(&[var(0), var(1)]);
        let target = stack(&[var(0)]);

        let mut pops = 0usize;
        let mut swap = |_: u32| {};
        let mut push_or_dup = |_: StackSlot| {};
        let mut pop = || pops += 1;
        shuffle(&mut current, &target, &mut swap, &mut push_or_dup, &mut pop).unwrap();

        assert_eq!(pops, 1);
        assert_eq!(current.as_slice(), &[var(0)]);
    }
}
