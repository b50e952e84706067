//! Macro for implementing Display and FromStr for status enums
//!
//! Status enums are stored as lowercase text in SQLite and travel as text in
//! HTTP bodies; this macro keeps both directions in one table.
//!
//! # Example
//!
//! ```rust
//! use hearthsync_domain::impl_domain_status_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum FeedState {
//!     Fresh,
//!     Stale,
//! }
//!
//! impl_domain_status_conversions!(FeedState {
//!     Fresh => "fresh",
//!     Stale => "stale",
//! });
//!
//! assert_eq!(FeedState::Stale.to_string(), "stale");
//! ```

/// Implements Display and FromStr traits for status enums
///
/// - Display writes the mapped string verbatim
/// - FromStr parses case-insensitively and reports the enum name on failure
#[macro_export]
macro_rules! impl_domain_status_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => write!(f, $str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}
