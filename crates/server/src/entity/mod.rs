//! Database entities for the campaign fulfillment pipeline.

pub mod campaign;
pub mod contact;
pub mod delivery_log;
pub mod mail_credential;
pub mod profile;
