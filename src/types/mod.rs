pub mod auth;
pub mod instrument;
pub mod ledger;
pub mod trade;
pub mod verification;

pub use auth::*;
pub use instrument::*;
pub use ledger::*;
pub use trade::*;
pub use verification::*;
