mod dispatcher;
mod helpers;
mod subscribed_newsletters;
mod unsubscribe;
