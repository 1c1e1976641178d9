//! Wire names for closed enums
//!
//! Every enum that crosses the wire or lands in a database column is spelled
//! in SCREAMING_SNAKE_CASE (`IN_PROGRESS`, `BLUE_GREEN`). Parsing is lenient
//! about case and accepts `-` in place of `_` so CLI input like
//! `--environment prod` or `--strategy blue-green` works.

use thiserror::Error;

/// A string did not name any variant of the expected enum
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownName {
    pub kind: &'static str,
    pub value: String,
}

/// Normalize user input before matching it against a wire name
pub(crate) fn normalize(input: &str) -> String {
    input.trim().to_ascii_uppercase().replace('-', "_")
}

/// Implement `ALL`, `as_str`, `Display` and `FromStr` for a fieldless enum
macro_rules! wire_names {
    ($ty:ident, $kind:literal { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Wire and storage name
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::names::UnknownName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match $crate::names::normalize(s).as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err($crate::names::UnknownName {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}
