/// Declares a fieldless enum whose variants map one-to-one onto AGI tokens.
///
/// Used for metadata attribute ids and the status values Asterisk stores in
/// channel variables. Generates the enum, an `ALL` slice in declaration
/// order, `as_str()`, `Display`, `AsRef<str>` and a case-sensitive `FromStr`
/// returning the given error type (a tuple struct holding the rejected
/// input, declared next to the enum).
///
/// ```ignore
/// define_wire_enum! {
///     error_type: ParseDialStatusError,
///     /// Outcome of `Dial()`.
///     pub enum DialStatus {
///         Answer => "ANSWER",
///         Busy => "BUSY",
///     }
/// }
/// ```
macro_rules! define_wire_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[ $( $Name::$variant, )+ ];

            /// Wire-format name string.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $wire => Ok($Name::$variant), )+
                    _ => Err($Err(s.to_string())),
                }
            }
        }
    };
}
