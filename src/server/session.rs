//! Host Session
//!
//! The helpdesk host authenticates the user and forwards the session through
//! trusted headers; this service never sees host credentials.
//!
//! - `X-Host-User-Id` - logged-in user
//! - `X-Host-Profile-Id` - active profile, used for dashboard rights
//! - `X-Host-Can-Manage` - `1`/`true` when the profile may edit rights and settings

use super::error::ApiError;
use crate::rights::ProfileId;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_HEADER: &str = "x-host-user-id";
pub const PROFILE_HEADER: &str = "x-host-profile-id";
pub const MANAGE_HEADER: &str = "x-host-can-manage";

/// Authenticated host session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSession {
    pub user_id: i64,
    pub profile_id: ProfileId,
    pub can_manage: bool,
}

impl HostSession {
    pub fn from_parts(parts: &Parts) -> Result<Self, ApiError> {
        let user_id = header_id(parts, USER_HEADER)?;
        let profile_id = header_id(parts, PROFILE_HEADER)?;
        let can_manage = parts
            .headers
            .get(MANAGE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| matches!(v, "1" | "true"));

        Ok(Self {
            user_id,
            profile_id,
            can_manage,
        })
    }
}

fn header_id(parts: &Parts, name: &str) -> Result<i64, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| ApiError::Unauthorized("No host session".to_string()))?;

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ApiError::Unauthorized(format!("Malformed {} header", name)))
}

impl<S> FromRequestParts<S> for HostSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        HostSession::from_parts(parts)
    }
}

/// Host session whose profile may manage rights and settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSession(pub HostSession);

impl<S> FromRequestParts<S> for ManagerSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = HostSession::from_parts(parts)?;
        if !session.can_manage {
            return Err(ApiError::Forbidden("Profile cannot manage Grafana".to_string()));
        }
        Ok(ManagerSession(session))
    }
}
