mod newsletters;
mod subscriptions;
mod unsubscribe;

pub use newsletters::{handle_create_newsletter, handle_get_newsletter, handle_own_newsletters};
pub use subscriptions::{handle_subscribe, handle_subscribed_newsletters};
pub use unsubscribe::handle_unsubscribe;
