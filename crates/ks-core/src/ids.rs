use core::fmt;
use core::num::NonZeroU32;

/// Declares a compact typed index.
///
/// Each id stores `index + 1` in a `NonZeroU32` so `Option<Id>` stays the
/// size of the id itself. Distinct types keep a variable index from being
/// used where an expression node is expected.
macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Create an id from a 0-based index.
            pub fn from_index(index: u32) -> Self {
                Self(NonZeroU32::MIN.saturating_add(index))
            }

            /// Recover the 0-based index.
            pub fn index(self) -> u32 {
                self.0.get() - 1
            }

            /// The 0-based index as an array offset.
            pub fn ix(self) -> usize {
                self.index() as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({})"), self.index())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.index())
            }
        }
    };
}

typed_id!(
    /// Index of a variable in the model's variable table.
    VarId,
    "VarId"
);
typed_id!(
    /// Index of an equation in the model's equation table.
    EqId,
    "EqId"
);
typed_id!(
    /// Index of an event in the model's event table.
    EventId,
    "EventId"
);
typed_id!(
    /// Index of a node in the model's expression arena.
    ExprId,
    "ExprId"
);
