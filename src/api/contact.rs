use axum::{
    body::Bytes,
    extract::{Path, State},
};
use serde::Serialize;
use tracing::info;

use crate::{
    app_state::AppState,
    error::{created, ok, ApiError, ApiResult},
    models::{Contact, ContactInput},
};

use super::parse_body;

const NOT_FOUND: &str = "Contact message not found";

#[derive(Serialize)]
pub struct ContactList {
    count: usize,
    contacts: Vec<Contact>,
}

#[derive(Serialize)]
pub struct ContactPayload {
    contact: Contact,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactReceipt {
    message: &'static str,
    contact_id: String,
}

pub async fn create_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<ContactReceipt> {
    let input: ContactInput = parse_body(&body)?;

    let missing = input.missing_fields();
    if !missing.is_empty() {
        return Err(ApiError::validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    }

    let contact = Contact::create(input).map_err(|e| ApiError::validation(e.joined()))?;
    state
        .contacts
        .insert(&contact)
        .await
        .map_err(|e| ApiError::internal("Failed to process contact form", e))?;

    info!(
        "Nuevo mensaje de contacto: id={} nombre={} email={}",
        contact.id, contact.name, contact.email
    );
    created(ContactReceipt {
        message: "Thank you for your message! I will get back to you soon.",
        contact_id: contact.id,
    })
}

pub async fn list_handler(State(state): State<AppState>) -> ApiResult<ContactList> {
    let contacts = state
        .contacts
        .list()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch contacts", e))?;
    ok(ContactList {
        count: contacts.len(),
        contacts,
    })
}

pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ContactPayload> {
    let contact = state
        .contacts
        .find(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to fetch contact", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    ok(ContactPayload { contact })
}

pub async fn mark_read_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ContactPayload> {
    let contact = state
        .contacts
        .mark_read(&id)
        .await
        .map_err(|e| ApiError::internal("Failed to update contact", e))?
        .ok_or_else(|| ApiError::not_found(NOT_FOUND))?;
    ok(ContactPayload { contact })
}
