//! Notifications: binding execution nodes to engine callbacks.

mod listener;
mod notification;

pub use listener::RunListener;
pub use notification::{NotificationFactory, TaskNotification};
