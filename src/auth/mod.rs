//! Authentication primitives: bearer tokens and one-time email codes.

pub mod code;
pub mod token;

pub use code::{CodeError, OneTimeCodes};
pub use token::{Claims, TokenError, TokenIssuer};
