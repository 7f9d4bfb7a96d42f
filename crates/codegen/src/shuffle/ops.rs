//! Layout queries and primitives the shuffle step works against.

use lamina_ir::{Stack, StackSlot};
use rustc_hash::FxHashMap;

/// Abstraction of stack shuffling operations over a current and a target
/// layout.
///
/// Offsets index from the stack bottom; `source` offsets address the
/// current layout, `target` offsets the target layout.
pub(super) trait ShuffleOps {
    /// Number of slots in the current layout.
    fn source_size(&self) -> usize;

    /// Number of slots in the target layout.
    fn target_size(&self) -> usize;

    /// True iff the slot currently at `source` is acceptable at `target`:
    /// both offsets are in range and the slots are identical or the target
    /// slot is junk.
    fn is_compatible(&self, source: usize, target: usize) -> bool;

    /// True iff the current slots at the two offsets are identical.
    fn source_is_same(&self, lhs: usize, rhs: usize) -> bool;

    /// Copy balance for the slot currently at `offset`: positive when the
    /// target wants more copies than the current layout holds, negative
    /// when the current layout holds too many, zero on exact match.
    fn source_multiplicity(&self, offset: usize) -> i32;

    /// Copy balance for the slot the target wants at `offset`.
    fn target_multiplicity(&self, offset: usize) -> i32;

    /// True iff any slot is acceptable at the given target offset.
    fn target_is_arbitrary(&self, offset: usize) -> bool;

    /// Swap the top slot with the slot `depth` positions below it.
    fn swap(&mut self, depth: usize);

    /// Drop the top slot.
    fn pop(&mut self);

    /// Materialize the slot the target wants at `offset` as the new top.
    fn push_or_dup_target(&mut self, offset: usize);
}

/// The concrete adapter: owns the mutable current layout for the duration
/// of one step, answers queries against a multiplicity table computed at
/// construction, and forwards every primitive to the caller hooks before
/// mutating `current` accordingly.
///
/// The table is a pure function of `(current, target)` and is never
/// updated mid-step; the shuffle loop constructs a fresh adapter per step.
pub(super) struct LayoutOps<'a, Swap, PushOrDup, Pop> {
    current: &'a mut Stack,
    target: &'a Stack,
    swap_hook: &'a mut Swap,
    push_or_dup_hook: &'a mut PushOrDup,
    pop_hook: &'a mut Pop,
    multiplicity: FxHashMap<StackSlot, i32>,
}

impl<'a, Swap, PushOrDup, Pop> LayoutOps<'a, Swap, PushOrDup, Pop>
where
    Swap: FnMut(u32),
    PushOrDup: FnMut(StackSlot),
    Pop: FnMut(),
{
    pub(super) fn new(
        current: &'a mut Stack,
        target: &'a Stack,
        swap_hook: &'a mut Swap,
        push_or_dup_hook: &'a mut PushOrDup,
        pop_hook: &'a mut Pop,
    ) -> Self {
        let mut multiplicity = FxHashMap::default();
        for slot in current.iter() {
            *multiplicity.entry(*slot).or_default() -= 1;
        }
        for (offset, slot) in target.iter().enumerate() {
            // A junk target position is absorbed by whatever currently sits
            // at the same offset, so it never demands a change.
            if slot.is_junk() && offset < current.len() {
                *multiplicity.entry(current[offset]).or_default() += 1;
            } else {
                *multiplicity.entry(*slot).or_default() += 1;
            }
        }

        Self {
            current,
            target,
            swap_hook,
            push_or_dup_hook,
            pop_hook,
            multiplicity,
        }
    }
}

impl<Swap, PushOrDup, Pop> ShuffleOps for LayoutOps<'_, Swap, PushOrDup, Pop>
where
    Swap: FnMut(u32),
    PushOrDup: FnMut(StackSlot),
    Pop: FnMut(),
{
    fn source_size(&self) -> usize {
        self.current.len()
    }

    fn target_size(&self) -> usize {
        self.target.len()
    }

    fn is_compatible(&self, source: usize, target: usize) -> bool {
        source < self.current.len()
            && target < self.target.len()
            && (self.target[target].is_junk() || self.current[source] == self.target[target])
    }

    fn source_is_same(&self, lhs: usize, rhs: usize) -> bool {
        self.current[lhs] == self.current[rhs]
    }

    fn source_multiplicity(&self, offset: usize) -> i32 {
        self.multiplicity[&self.current[offset]]
    }

    fn target_multiplicity(&self, offset: usize) -> i32 {
        self.multiplicity[&self.target[offset]]
    }

    fn target_is_arbitrary(&self, offset: usize) -> bool {
        offset < self.target.len() && self.target[offset].is_junk()
    }

    fn swap(&mut self, depth: usize) {
        (self.swap_hook)(depth as u32);
        self.current.swap_with_top(depth);
    }

    fn pop(&mut self) {
        (self.pop_hook)();
        self.current.pop();
    }

    fn push_or_dup_target(&mut self, offset: usize) {
        let slot = self.target[offset];
        (self.push_or_dup_hook)(slot);
        self.current.push(slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lamina_ir::{U256, VariableId};

    fn var(n: u32) -> StackSlot {
        StackSlot::Var(VariableId(n))
    }

    fn stack(slots: &[StackSlot]) -> Stack {
        slots.iter().copied().collect()
    }

    fn with_ops<R>(
        current: &mut Stack,
        target: &Stack,
        f: impl FnOnce(&mut LayoutOps<'_, fn(u32), fn(StackSlot), fn()>) -> R,
    ) -> R {
        let mut swap: fn(u32) = |_| {};
        let mut push_or_dup: fn(StackSlot) = |_| {};
        let mut pop: fn() = || {};
        let mut ops = LayoutOps::new(current, target, &mut swap, &mut push_or_dup, &mut pop);
        f(&mut ops)
    }

    #[test]
    fn multiplicity_counts_copies() {
        // current [a, a, b], target [a, c]: one surplus `a`, one surplus
        // `b`, one missing `c`.
        let mut current = stack(&[var(0), var(0), var(1)]);
        let target = stack(&[var(0), var(2)]);
        with_ops(&mut current, &target, |ops| {
            assert_eq!(ops.source_multiplicity(0), -1);
            assert_eq!(ops.source_multiplicity(2), -1);
            assert_eq!(ops.target_multiplicity(1), 1);
        });
    }

    #[test]
    fn junk_target_is_absorbed_by_source_slot() {
        // The junk at target offset 0 counts as a copy of `b`, which sits
        // there in the current layout; `b` therefore balances out.
        let mut current = stack(&[var(1)]);
        let target = stack(&[StackSlot::Junk, var(1)]);
        with_ops(&mut current, &target, |ops| {
            assert_eq!(ops.source_multiplicity(0), 1);
            assert!(ops.target_is_arbitrary(0));
            assert!(!ops.target_is_arbitrary(1));
            assert!(!ops.target_is_arbitrary(2));
        });
    }

    #[test]
    fn junk_target_beyond_source_counts_as_junk() {
        let mut current = stack(&[var(0)]);
        let target = stack(&[var(0), StackSlot::Junk]);
        with_ops(&mut current, &target, |ops| {
            // Offset 1 is past the current layout, so the junk is not
            // absorbed and wants one junk copy.
            assert_eq!(ops.target_multiplicity(1), 1);
            assert_eq!(ops.source_multiplicity(0), 0);
        });
    }

    #[test]
    fn compatibility() {
        let mut current = stack(&[var(0), StackSlot::Imm(U256::from(1))]);
        let target = stack(&[var(0), StackSlot::Junk]);
        with_ops(&mut current, &target, |ops| {
            assert!(ops.is_compatible(0, 0));
            // Junk in the target role matches any source slot.
            assert!(ops.is_compatible(0, 1));
            assert!(ops.is_compatible(1, 1));
            assert!(!ops.is_compatible(1, 0));
            // Out-of-range offsets are never compatible.
            assert!(!ops.is_compatible(2, 0));
            assert!(!ops.is_compatible(0, 2));
        });
    }

    #[test]
    fn primitives_invoke_hooks_and_mutate_in_lock_step() {
        let mut current = stack(&[var(0), var(1)]);
        let target = stack(&[var(1), var(0), var(2)]);

        let mut swaps = Vec::new();
        let mut pushes = Vec::new();
        let mut pops = 0usize;
        {
            let mut swap = |depth: u32| swaps.push(depth);
            let mut push_or_dup = |slot: StackSlot| pushes.push(slot);
            let mut pop = || pops += 1;
            let mut ops =
                LayoutOps::new(&mut current, &target, &mut swap, &mut push_or_dup, &mut pop);

            ops.swap(1);
            ops.push_or_dup_target(2);
            ops.pop();
        }

        assert_eq!(swaps, [1]);
        assert_eq!(pushes, [var(2)]);
        assert_eq!(pops, 1);
        assert_eq!(current.as_slice(), &[var(1), var(0)]);
    }
}
