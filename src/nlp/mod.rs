//! Turning raw classifier output into a [`ClassifiedIntent`].
//!
//! The classifier is a black box that returns arbitrary text. Everything in
//! this module is infallible by construction: malformed input degrades to the
//! `unknown` intent with a canned help message rather than an error.

pub mod extract;
pub mod intent;
pub mod normalize;

pub use extract::extract_json;
pub use intent::{ClassifiedIntent, ContactRef, Intent, IntentAction, MatchType};
pub use normalize::{FALLBACK_MESSAGE, normalize_response, normalize_value};
