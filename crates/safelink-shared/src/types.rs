use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::validation::{ValidationErrors, Validator};

/// Current time truncated to microseconds, the precision the store keeps.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// User identity is issued by the external auth service; we only carry it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identity of an emergency alert, allocated once at creation.
    AlertId
);
uuid_id!(
    /// Identity of a trusted contact entry.
    ContactId
);
uuid_id!(
    /// Identity of a community report.
    ReportId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    #[serde(alias = "security_partner")]
    Responder,
    Admin,
}

impl Role {
    /// Responders and admins see every alert and may resolve any of them.
    pub fn is_responder(self) -> bool {
        matches!(self, Role::Responder | Role::Admin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Responder => "responder",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "responder" | "security_partner" => Ok(Role::Responder),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// An authenticated caller: who they are and what they may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role,
        }
    }

    pub fn is_responder(&self) -> bool {
        self.role.is_responder()
    }

    pub fn is(&self, user: &UserId) -> bool {
        &self.user_id == user
    }
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// A validated 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: u32,
    limit: u32,
}

impl Page {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self, ValidationErrors> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE);

        let mut v = Validator::new();
        v.check(page >= 1, "page", "must be 1 or greater").check(
            (1..=MAX_PAGE_SIZE).contains(&limit),
            "limit",
            format!("must be between 1 and {MAX_PAGE_SIZE}"),
        );
        v.finish()?;

        Ok(Self { page, limit })
    }

    /// 1-based page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

/// One page of results plus the totals a client needs to page further.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, page: Page) -> Self {
        let limit = u64::from(page.limit);
        Self {
            items,
            pagination: Pagination {
                total,
                page: page.page,
                limit: page.limit,
                total_pages: total.div_ceil(limit),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_accepts_legacy_alias() {
        let role: Role = serde_json::from_str("\"security_partner\"").unwrap();
        assert_eq!(role, Role::Responder);
        assert!(role.is_responder());
        assert!(!Role::User.is_responder());
    }

    #[test]
    fn page_defaults_and_offset() {
        let page = Page::new(None, None).unwrap();
        assert_eq!(page, Page::default());

        let page = Page::new(Some(3), Some(10)).unwrap();
        assert_eq!(page.offset(), 20);
    }

    #[test]
    fn page_rejects_zero_and_oversized() {
        let errors = Page::new(Some(0), Some(1000)).unwrap_err();
        assert!(errors.has_field("page"));
        assert!(errors.has_field("limit"));
    }

    #[test]
    fn first_page_starts_at_zero() {
        let page = Page::default();
        assert_eq!((page.page(), page.limit()), (1, DEFAULT_PAGE_SIZE));
        assert_eq!(page.offset(), 0);
        assert!(Page::new(Some(0), None).is_err());
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = Page::new(Some(1), Some(20)).unwrap();
        let p = Paginated::<u8>::new(vec![], 41, page);
        assert_eq!(p.pagination.total_pages, 3);

        let p = Paginated::<u8>::new(vec![], 0, page);
        assert_eq!(p.pagination.total_pages, 0);
    }

    #[test]
    fn alert_id_round_trips_through_str() {
        let id = AlertId::new();
        let parsed: AlertId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
