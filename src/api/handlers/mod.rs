pub mod accounts;
pub mod events;
pub mod health;

pub use self::accounts::verification;
pub use self::events::email_confirmed;
pub use self::health::health;
