//! Accounts as seen by this service, and what happens when one is verified.

pub mod events;
pub mod model;
pub mod notify;
pub mod store;

pub use self::events::{EmailConfirmed, EventBus, Receiver, RequestContext};
pub use self::model::Account;
pub use self::notify::AdminNotifier;
pub use self::store::{AccountStore, PgAccountStore};
