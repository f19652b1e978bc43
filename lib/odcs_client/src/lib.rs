pub mod deserializers;
pub mod entities;
pub mod requests;
pub mod responses;
