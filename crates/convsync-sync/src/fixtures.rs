// SPDX-FileCopyrightText: 2026 Convsync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic offline conversation used when the backend yields nothing.
//!
//! The records deliberately use the same mix of wire shapes the live backend
//! produces, so they go through the normalizer like any other source.

use serde_json::{Value, json};

use convsync_core::ConversationKey;

/// Raw records for an offline sample conversation with `key`'s contact.
pub fn sample_conversation(key: &ConversationKey) -> Vec<Value> {
    let contact = key.contact_id();
    let platform = key.platform().to_string();

    vec![
        json!({
            "id": format!("fixture-{}-1", key.match_key()),
            "platform": platform,
            "contact_id": contact,
            "is_from_contact": true,
            "content": "Hola, quisiera hacer un pedido",
            "created_at": "2024-01-01T10:00:00Z",
            "status": "read",
        }),
        json!({
            "id": format!("fixture-{}-2", key.match_key()),
            "platform": platform,
            "contact_id": contact,
            "is_from_contact": false,
            "sent_by_user": "Asistente IA",
            "content": "¡Hola! Con gusto te ayudo. ¿Qué te gustaría pedir?",
            "created_at": "2024-01-01T10:00:05Z",
            "status": "delivered",
        }),
        json!({
            "id": format!("fixture-{}-3", key.match_key()),
            "platform": platform,
            "contact_id": contact,
            "is_from_contact": true,
            "text": "Prefiero hablar con una persona",
            "date": "2024-01-01T10:01:00Z",
        }),
        json!({
            "id": format!("fixture-{}-4", key.match_key()),
            "platform": platform,
            "contact_id": contact,
            "is_from_contact": false,
            "sent_by_user": "Agente Laura",
            "content": "Hola, soy Laura. ¿En qué puedo ayudarte?",
            "created_at": "2024-01-01T10:02:30Z",
            "metadata": { "fixture": true },
        }),
    ]
}
