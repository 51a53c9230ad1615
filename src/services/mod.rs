pub mod accounts;
pub mod auth;
pub mod payments;
pub mod price_book;
pub mod price_ingestion;
pub mod rates;
pub mod sqlite_store;
pub mod trading;
pub mod user_locks;
pub mod verification;

pub use accounts::AccountService;
pub use auth::{AuthError, AuthService};
pub use payments::{AcceptAllPayments, HttpPaymentVerifier, PaymentStatus, PaymentVerifier};
pub use price_book::{PriceBook, PriceBookError};
pub use price_ingestion::{IngestionConfig, IngestionError, IngestionReport, PriceIngestor};
pub use rates::{RateBook, RateSource};
pub use sqlite_store::SqliteStore;
pub use trading::{EngineConfig, TradeEngine, TradeError};
pub use user_locks::{UserLockGuard, UserLocks};
pub use verification::{IdentityGate, VerificationError, VerificationRegistry};
