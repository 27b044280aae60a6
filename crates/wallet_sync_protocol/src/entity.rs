//! Synchronized entity model.
//!
//! An [`Entity`] is a versioned record with a kind-specific payload. The
//! owning account is deliberately absent: it is a server-side attribute
//! taken from the authenticated session, never from the wire.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned modification time in milliseconds since the Unix epoch.
///
/// Timestamps are totally ordered and only compared, never interpreted by the
/// protocol. `Timestamp::ZERO` is what a client sends on its first sync.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The timestamp before any write.
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The three synchronized entity kinds, in exchange order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    /// Money accounts (wallets, cards, cash).
    Account,
    /// Expense and income categories.
    Category,
    /// Individual money operations.
    Operation,
}

/// Static description of one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    /// The kind described.
    pub kind: EntityKind,
    /// Storage collection name.
    pub collection: &'static str,
    /// Upper-case plural used in phase names.
    pub phase_label: &'static str,
}

const DESCRIPTORS: [KindDescriptor; 3] = [
    KindDescriptor {
        kind: EntityKind::Account,
        collection: "accounts",
        phase_label: "ACCOUNTS",
    },
    KindDescriptor {
        kind: EntityKind::Category,
        collection: "categories",
        phase_label: "CATEGORIES",
    },
    KindDescriptor {
        kind: EntityKind::Operation,
        collection: "operations",
        phase_label: "OPERATIONS",
    },
];

impl EntityKind {
    /// All kinds in exchange order.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Account,
        EntityKind::Category,
        EntityKind::Operation,
    ];

    /// Returns the kind exchanged after this one, or `None` after the last.
    #[must_use]
    pub const fn next(self) -> Option<EntityKind> {
        match self {
            EntityKind::Account => Some(EntityKind::Category),
            EntityKind::Category => Some(EntityKind::Operation),
            EntityKind::Operation => None,
        }
    }

    /// Returns the static descriptor for this kind.
    #[must_use]
    pub const fn descriptor(self) -> &'static KindDescriptor {
        match self {
            EntityKind::Account => &DESCRIPTORS[0],
            EntityKind::Category => &DESCRIPTORS[1],
            EntityKind::Operation => &DESCRIPTORS[2],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().collection)
    }
}

/// Category direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CategoryType {
    /// Money going out.
    Expense = 0,
    /// Money coming in.
    Income = 1,
}

impl TryFrom<u8> for CategoryType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CategoryType::Expense),
            1 => Ok(CategoryType::Income),
            other => Err(format!("unknown category type {other}")),
        }
    }
}

impl From<CategoryType> for u8 {
    fn from(value: CategoryType) -> Self {
        value as u8
    }
}

/// Account payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AccountFields {
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Currency code, e.g. `USD`.
    pub currency: String,
    /// Balance as a plain decimal string.
    pub amount: String,
    /// ARGB display color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<i32>,
}

/// Category payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CategoryFields {
    /// Display name.
    pub name: String,
    /// Expense or income.
    pub category_type: CategoryType,
    /// Account pre-selected when this category is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_account_id: Option<String>,
}

/// Operation payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperationFields {
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Amount as a plain decimal string.
    pub amount: String,
    /// When the operation happened, epoch milliseconds.
    pub time: i64,
    /// Category of the operation.
    pub category_id: String,
    /// Account money is taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orderer_id: Option<String>,
    /// Account money is moved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiary_id: Option<String>,
    /// Exchange rate for transfers between currencies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converting_rate: Option<f64>,
}

/// Kind-tagged entity payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityPayload {
    /// Account fields.
    Account(AccountFields),
    /// Category fields.
    Category(CategoryFields),
    /// Operation fields.
    Operation(OperationFields),
}

impl EntityPayload {
    /// Returns the kind of this payload.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            EntityPayload::Account(_) => EntityKind::Account,
            EntityPayload::Category(_) => EntityKind::Category,
            EntityPayload::Operation(_) => EntityKind::Operation,
        }
    }
}

/// An entity as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Entity {
    /// Entity ID, unique per owner and kind.
    pub id: String,
    /// Tombstone flag.
    pub deleted: bool,
    /// Server timestamp of the last write. Ignored on input, where it may
    /// be omitted.
    #[serde(default)]
    pub last_modified: Timestamp,
    /// Kind-specific fields.
    pub payload: EntityPayload,
}

impl Entity {
    /// Returns the kind of this entity.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    /// Checks that the entity is well formed for the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidEntity`] for an empty ID, a payload of
    /// another kind, or an amount that is not a plain decimal string.
    pub fn validate(&self, expected: EntityKind) -> ProtocolResult<()> {
        if self.id.is_empty() {
            return Err(ProtocolError::invalid_entity(&self.id, "empty id"));
        }
        if self.kind() != expected {
            return Err(ProtocolError::invalid_entity(
                &self.id,
                format!("{} payload while syncing {}", self.kind(), expected),
            ));
        }

        let amount = match &self.payload {
            EntityPayload::Account(fields) => Some(&fields.amount),
            EntityPayload::Operation(fields) => Some(&fields.amount),
            EntityPayload::Category(_) => None,
        };
        if let Some(amount) = amount {
            if !is_plain_decimal(amount) {
                return Err(ProtocolError::invalid_entity(
                    &self.id,
                    format!("amount {amount:?} is not a plain decimal"),
                ));
            }
        }
        Ok(())
    }
}

/// Accepts `-?digits(.digits)?`, the form produced by plain decimal
/// formatting without exponent.
fn is_plain_decimal(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s);
    let (int, frac) = match s.split_once('.') {
        Some((int, frac)) => (int, Some(frac)),
        None => (s, None),
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    digits(int) && frac.map_or(true, digits)
}
