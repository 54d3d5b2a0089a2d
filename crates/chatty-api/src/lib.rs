pub mod auth;
pub mod convert;
pub mod error;
pub mod friends;
pub mod google;
pub mod messages;
pub mod middleware;
pub mod uploads;

#[cfg(test)]
pub(crate) mod testutil;
