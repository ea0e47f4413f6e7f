//! Address book route handlers.
//!
//! These routes require authentication. Saved addresses pre-fill checkout;
//! orders keep their own snapshot, so edits here never touch past orders.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use shopclub_core::{AddressId, FieldErrors, PostalAddressInput, ShippingAddress, UserId};

use crate::db::AddressRepository;
use crate::error::AppError;
use crate::middleware::{RequireAuth, set_flash, take_flash};
use crate::state::AppState;

const ADDRESSES_PATH: &str = "/account/addresses";

/// Saved address display data for templates.
#[derive(Clone)]
pub struct AddressView {
    pub id: i32,
    pub full_name: String,
    pub phone: String,
    pub address_line_1: String,
    pub address_line_2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub is_default: bool,
}

impl From<&ShippingAddress> for AddressView {
    fn from(saved: &ShippingAddress) -> Self {
        let a = &saved.address;
        Self {
            id: saved.id.as_i32(),
            full_name: a.full_name.clone(),
            phone: a.phone.clone(),
            address_line_1: a.address_line_1.clone(),
            address_line_2: a.address_line_2.clone(),
            city: a.city.clone(),
            state: a.state.clone(),
            postal_code: a.postal_code.clone(),
            country: a.country.clone(),
            is_default: saved.is_default,
        }
    }
}

/// New address form data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AddressForm {
    #[serde(flatten)]
    pub address: PostalAddressInput,
    /// Checkbox; present when ticked.
    pub make_default: Option<String>,
}

/// Address book page template.
#[derive(Template, WebTemplate)]
#[template(path = "account/addresses.html")]
pub struct AddressesTemplate {
    pub addresses: Vec<AddressView>,
    pub form: AddressForm,
    pub errors: FieldErrors,
    pub flash: Option<String>,
}

async fn render_addresses(
    state: &AppState,
    session: &Session,
    user_id: UserId,
    form: AddressForm,
    errors: FieldErrors,
) -> Result<AddressesTemplate, AppError> {
    let addresses = AddressRepository::new(state.pool()).list(user_id).await?;

    Ok(AddressesTemplate {
        addresses: addresses.iter().map(AddressView::from).collect(),
        form,
        errors,
        flash: take_flash(session).await,
    })
}

/// Display the address book.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn addresses(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
) -> Result<AddressesTemplate, AppError> {
    render_addresses(
        &state,
        &session,
        user.id,
        AddressForm::default(),
        FieldErrors::new(),
    )
    .await
}

/// Save a new address.
///
/// The first address a user saves becomes the default.
#[instrument(skip(state, session, user, form), fields(user_id = %user.id))]
pub async fn create_address(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Form(form): Form<AddressForm>,
) -> Result<Response, AppError> {
    let address = match form.address.validate() {
        Ok(address) => address,
        Err(errors) => {
            let page = render_addresses(&state, &session, user.id, form, errors).await?;
            return Ok((StatusCode::UNPROCESSABLE_ENTITY, page).into_response());
        }
    };

    let repo = AddressRepository::new(state.pool());
    let make_default = form.make_default.is_some() || repo.default_for(user.id).await?.is_none();
    let saved = repo.create(user.id, &address, make_default).await?;

    tracing::info!(address_id = %saved.id, is_default = saved.is_default, "Address saved");
    set_flash(&session, "Address saved.").await;
    Ok(Redirect::to(ADDRESSES_PATH).into_response())
}

/// Make an address the default.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn set_default(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Redirect, AppError> {
    if !AddressRepository::new(state.pool())
        .set_default(user.id, AddressId::new(id))
        .await?
    {
        return Err(AppError::NotFound(format!("address {id}")));
    }

    set_flash(&session, "Default address updated.").await;
    Ok(Redirect::to(ADDRESSES_PATH))
}

/// Delete an address.
#[instrument(skip(state, session, user), fields(user_id = %user.id))]
pub async fn delete_address(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    Path(id): Path<i32>,
) -> Result<Redirect, AppError> {
    if !AddressRepository::new(state.pool())
        .delete(user.id, AddressId::new(id))
        .await?
    {
        return Err(AppError::NotFound(format!("address {id}")));
    }

    set_flash(&session, "Address deleted.").await;
    Ok(Redirect::to(ADDRESSES_PATH))
}
