mod cedis;
mod helpers;
pub mod op;
mod secret;

pub use cedis::{Cedis, CedisConversionError, GHS_CURRENCY_CODE, GHS_CURRENCY_CODE_LOWER};
pub use helpers::{normalize_msisdn, parse_boolean_flag};
pub use secret::Secret;
