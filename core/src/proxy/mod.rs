//! Token response interception
//!
//! Sits between the token endpoint and its caller: a response either goes
//! out unchanged or is replaced by a single error document.

pub mod gateway;
pub mod token;

pub use gateway::ProxyResponse;
pub use token::{TokenProxy, UpstreamResponse};
