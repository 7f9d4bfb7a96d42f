//! Stack slot definitions.
//!
//! A [`StackSlot`] identifies what logically occupies one position of the
//! operand stack. Slot equality is structural; the "junk matches anything"
//! rule applies only to target-role slots and lives in the layout
//! compatibility predicate, not here.

use core::fmt;

use crate::U256;

/// An opaque reference to a named variable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct VariableId(pub u32);
cranelift_entity::entity_impl!(VariableId);

/// An opaque reference to a pending call site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Copy, Hash)]
pub struct CallSiteId(pub u32);
cranelift_entity::entity_impl!(CallSiteId);

/// What logically sits in one stack position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackSlot {
    /// Return address pushed for a specific pending call site.
    CallRetAddr { call: CallSiteId },

    /// Return address of the current function, not tied to any call site.
    FuncRetAddr,

    /// The current value of a variable.
    Var(VariableId),

    /// A constant.
    Imm(U256),

    /// The `index`-th result of a pending call, not yet consumed.
    CallRet { call: CallSiteId, index: u32 },

    /// A position whose content is irrelevant.
    Junk,
}

impl StackSlot {
    pub fn is_junk(&self) -> bool {
        matches!(self, Self::Junk)
    }
}

impl fmt::Display for StackSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallRetAddr { call } => write!(f, "RET[c{}]", call.as_u32()),
            Self::FuncRetAddr => write!(f, "RET"),
            Self::Var(v) => write!(f, "v{}", v.as_u32()),
            Self::Imm(imm) => write!(f, "{imm:#x}"),
            Self::CallRet { call, index } => write!(f, "TMP[c{}, {index}]", call.as_u32()),
            Self::Junk => write!(f, "JUNK"),
        }
    }
}
