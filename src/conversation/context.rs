//! Conversation scenarios and the roles available in each.
//!
//! A [`Context`] frames the whole conversation (restaurant, hospital, …) and
//! a [`Role`] is the assisted user's stance inside it.  Both are chosen before
//! the session starts and stay fixed until a new context is selected.
//!
//! Ids are the lowercase strings sent to the suggestion service and written
//! to `settings.toml`; labels are the Korean names shown to the user.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label used when a context id is not one of the known scenarios.
pub const GENERIC_CONTEXT_LABEL: &str = "대화";

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Real-world scenario framing the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    Restaurant,
    Hospital,
    Classroom,
    Cafe,
    Store,
    Bank,
}

impl Context {
    /// Every selectable context, in menu order.
    pub const ALL: [Context; 6] = [
        Context::Restaurant,
        Context::Hospital,
        Context::Classroom,
        Context::Cafe,
        Context::Store,
        Context::Bank,
    ];

    /// Wire id (`"restaurant"`, `"hospital"`, …).
    pub fn id(&self) -> &'static str {
        match self {
            Context::Restaurant => "restaurant",
            Context::Hospital => "hospital",
            Context::Classroom => "classroom",
            Context::Cafe => "cafe",
            Context::Store => "store",
            Context::Bank => "bank",
        }
    }

    /// Korean display label.
    pub fn label(&self) -> &'static str {
        match self {
            Context::Restaurant => "식당",
            Context::Hospital => "병원",
            Context::Classroom => "교실",
            Context::Cafe => "카페",
            Context::Store => "상점",
            Context::Bank => "은행",
        }
    }

    /// Roles the user may take in this context.  The first one is the default.
    pub fn roles(&self) -> &'static [Role] {
        match self {
            Context::Restaurant | Context::Cafe | Context::Store | Context::Bank => {
                &[Role::Customer]
            }
            Context::Hospital => &[Role::Patient, Role::Visitor],
            Context::Classroom => &[Role::Student],
        }
    }

    pub fn default_role(&self) -> Role {
        self.roles()[0]
    }

    pub fn allows_role(&self, role: Role) -> bool {
        self.roles().contains(&role)
    }
}

/// Label for an arbitrary context id, falling back to [`GENERIC_CONTEXT_LABEL`].
pub fn label_for(id: &str) -> &'static str {
    id.parse::<Context>()
        .map(|c| c.label())
        .unwrap_or(GENERIC_CONTEXT_LABEL)
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Context {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Context::ALL
            .into_iter()
            .find(|c| c.id().eq_ignore_ascii_case(wanted) || c.label() == wanted)
            .ok_or_else(|| UnknownTag::Context(wanted.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// The assisted user's stance within a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Patient,
    Visitor,
    Student,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Customer, Role::Patient, Role::Visitor, Role::Student];

    pub fn id(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Patient => "patient",
            Role::Visitor => "visitor",
            Role::Student => "student",
        }
    }

    /// Korean label.  "customer" reads 손님 at a cafe or store and 고객
    /// elsewhere.
    pub fn label_in(&self, context: Context) -> &'static str {
        match (self, context) {
            (Role::Customer, Context::Cafe | Context::Store) => "손님",
            (Role::Customer, _) => "고객",
            (Role::Patient, _) => "환자",
            (Role::Visitor, _) => "방문객",
            (Role::Student, _) => "학생",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Role {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Role::ALL
            .into_iter()
            .find(|r| r.id().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownTag::Role(wanted.to_string()))
    }
}

/// A context or role id that is not in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnknownTag {
    #[error("unknown context: {0:?}")]
    Context(String),
    #[error("unknown role: {0:?}")]
    Role(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
