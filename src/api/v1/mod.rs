pub mod account;
pub mod assignment;
pub mod auth;
pub mod parcel;
pub mod scope;
pub mod token;
