//! Notification Worker & Ledger (C9/C10)

pub mod ledger;
pub mod mailer;
pub mod templates;
pub mod worker;

pub use ledger::NotificationLedger;
pub use mailer::NotificationMailer;
pub use worker::NotificationWorker;
