//! OIDC id token handling
//!
//! Extracts the subject's identity claims from the `id_token` of a token
//! endpoint response, optionally verifying its signature against a JWKS.

mod claims;
mod jwks;
mod validate;

pub use claims::{IdTokenDecoder, IdentityClaims};
