//! Property-based test generators using proptest.
//!
//! Every generated entity passes [`Entity::validate`] for its kind.

use proptest::prelude::*;
use wallet_sync_protocol::{
    AccountFields, CategoryFields, CategoryType, Entity, EntityKind, EntityPayload,
    OperationFields, Timestamp,
};

/// Strategy for entity IDs.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for plain decimal amounts.
pub fn amount_strategy() -> impl Strategy<Value = String> {
    (any::<bool>(), 0u32..1_000_000, prop::option::of(0u32..100)).prop_map(
        |(negative, int, frac)| {
            let sign = if negative { "-" } else { "" };
            match frac {
                Some(frac) => format!("{sign}{int}.{frac:02}"),
                None => format!("{sign}{int}"),
            }
        },
    )
}

fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z ]{1,16}").expect("Invalid regex")
}

fn payload_strategy(kind: EntityKind) -> BoxedStrategy<EntityPayload> {
    match kind {
        EntityKind::Account => (
            name_strategy(),
            prop::option::of(name_strategy()),
            prop::sample::select(vec!["USD", "EUR", "RUB"]),
            amount_strategy(),
            prop::option::of(any::<i32>()),
        )
            .prop_map(|(name, description, currency, amount, color)| {
                EntityPayload::Account(AccountFields {
                    name,
                    description,
                    currency: currency.to_string(),
                    amount,
                    color,
                })
            })
            .boxed(),
        EntityKind::Category => (
            name_strategy(),
            any::<bool>(),
            prop::option::of(entity_id_strategy()),
        )
            .prop_map(|(name, income, preferred_account_id)| {
                EntityPayload::Category(CategoryFields {
                    name,
                    category_type: if income {
                        CategoryType::Income
                    } else {
                        CategoryType::Expense
                    },
                    preferred_account_id,
                })
            })
            .boxed(),
        EntityKind::Operation => (
            prop::option::of(name_strategy()),
            amount_strategy(),
            any::<i64>(),
            entity_id_strategy(),
            prop::option::of(entity_id_strategy()),
            prop::option::of(entity_id_strategy()),
            prop::option::of(0.01f64..100.0),
        )
            .prop_map(
                |(description, amount, time, category_id, orderer_id, beneficiary_id, converting_rate)| {
                    EntityPayload::Operation(OperationFields {
                        description,
                        amount,
                        time,
                        category_id,
                        orderer_id,
                        beneficiary_id,
                        converting_rate,
                    })
                },
            )
            .boxed(),
    }
}

/// Strategy for a wire entity of `kind`.
pub fn entity_strategy(kind: EntityKind) -> impl Strategy<Value = Entity> {
    (
        entity_id_strategy(),
        any::<bool>(),
        0u64..1_000_000,
        payload_strategy(kind),
    )
        .prop_map(|(id, deleted, millis, payload)| Entity {
            id,
            deleted,
            last_modified: Timestamp::from_millis(millis),
            payload,
        })
}

/// Strategy for a batch of entities of `kind` with distinct IDs.
pub fn distinct_entities_strategy(
    kind: EntityKind,
    max: usize,
) -> impl Strategy<Value = Vec<Entity>> {
    prop::collection::vec(entity_strategy(kind), 0..=max).prop_map(|mut entities| {
        let mut seen = std::collections::HashSet::new();
        entities.retain(|e| seen.insert(e.id.clone()));
        entities
    })
}
