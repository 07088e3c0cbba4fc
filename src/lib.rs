// Session, user and credential management core for the PMP auth service

pub mod config;
pub mod crypto;
pub mod kv;
pub mod mailer;
pub mod session;
pub mod user;
