//! HTTP request handlers.

use crate::db::{Book, BookAggregate, Rating, User, now_timestamp};
use crate::error::{AppError, FieldErrors, Result};
use crate::library::{BookDetails, BookForm, BookView, CatalogParams, Page, UploadedFile};
use crate::server::AppState;
use crate::server::extract::{AdminUser, CurrentUser, MaybeUser};
use crate::subscription::SubscriptionStatus;
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

/// JSON envelope of successful responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: None,
            data: Some(data),
        })
    }

    fn with_message(message: &str, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    fn message(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.to_string()),
            data: None,
        })
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>>;

/// Unwrap a JSON body, keeping the error envelope on malformed input.
///
/// Well-formed JSON of the wrong shape is a validation failure; anything
/// that is not JSON at all is a bad request.
fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value).map_err(|e| match e {
        JsonRejection::JsonDataError(e) => {
            AppError::Validation(FieldErrors::single("body", e.body_text()))
        }
        other => AppError::BadRequest(other.body_text()),
    })
}

fn find_book(state: &AppState, id: &str) -> Result<Book> {
    state
        .db
        .get_book(id)?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

/// Register request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password_confirmation: String,
}

/// Issued token with its user.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    user: User,
    token: String,
    token_type: &'static str,
}

impl TokenResponse {
    fn bearer(user: User, token: String) -> Self {
        Self {
            user,
            token,
            token_type: "Bearer",
        }
    }
}

/// Caller profile.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    #[serde(flatten)]
    user: User,
    is_premium: bool,
    is_admin: bool,
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<TokenResponse>>)> {
    let req = json_body(body)?;

    state.auth.register(&crate::auth::Registration {
        name: &req.name,
        email: &req.email,
        password: &req.password,
        password_confirmation: &req.password_confirmation,
    })?;
    let (user, token) = state.auth.login(&req.email, &req.password)?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(
            "User registered successfully",
            TokenResponse::bearer(user, token),
        ),
    ))
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<TokenResponse> {
    let req = json_body(body)?;

    let mut errors = FieldErrors::new();
    if req.email.trim().is_empty() {
        errors.add("email", "The email field is required.");
    }
    if req.password.is_empty() {
        errors.add("password", "The password field is required.");
    }
    errors.into_result()?;

    let (user, token) = state.auth.login(&req.email, &req.password)?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(ApiResponse::with_message(
        "Login successful",
        TokenResponse::bearer(user, token),
    ))
}

/// Auth logout.
pub async fn auth_logout(State(state): State<AppState>, caller: CurrentUser) -> ApiResult<()> {
    state.auth.logout(&caller.token)?;
    Ok(ApiResponse::message("Successfully logged out"))
}

/// Replace the caller's token.
pub async fn auth_refresh(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> ApiResult<TokenResponse> {
    let (user, token) = state.auth.refresh(&caller.token)?;
    Ok(ApiResponse::data(TokenResponse::bearer(user, token)))
}

/// Get current user info.
pub async fn auth_me(State(state): State<AppState>, caller: CurrentUser) -> ApiResult<MeResponse> {
    let mut user = caller.user;
    let is_premium = state.entitlements.is_premium(&mut user, now_timestamp())?;
    let is_admin = user.is_admin();

    Ok(ApiResponse::data(MeResponse {
        user,
        is_premium,
        is_admin,
    }))
}

// ============================================================================
// BOOK HANDLERS
// ============================================================================

/// Catalog listing.
pub async fn book_list(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    query: std::result::Result<Query<CatalogParams>, QueryRejection>,
) -> ApiResult<Page<BookView>> {
    let Query(params) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let query = params.parse()?;
    let page = state.catalog.search(&query, caller.as_ref())?;
    Ok(ApiResponse::data(page))
}

/// Book details with recent ratings.
pub async fn book_show(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    Path(id): Path<String>,
) -> ApiResult<BookDetails> {
    let details = state.catalog.get_one(&id, caller.as_ref())?;
    Ok(ApiResponse::data(details))
}

/// PDF download, signed-in callers only.
pub async fn book_download(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    let mut user = caller.user;
    let book = find_book(&state, &id)?;
    let content = state.gate.open(&book, Some(&mut user), now_timestamp())?;

    tracing::info!(user_id = %user.id, book_id = %book.id, "Book downloaded");
    stream_pdf(&book, content, "attachment").await
}

/// PDF for the online reader.
pub async fn book_read(
    State(state): State<AppState>,
    MaybeUser(mut caller): MaybeUser,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    let book = find_book(&state, &id)?;
    let content = state.gate.open(&book, caller.as_mut(), now_timestamp())?;
    stream_pdf(&book, content, "inline").await
}

async fn stream_pdf(
    book: &Book,
    content: crate::library::BookContent,
    disposition: &str,
) -> Result<Response<Body>> {
    let file = match tokio::fs::File::open(&content.path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::ContentMissing(book.pdf_file.clone()));
        }
        Err(e) => return Err(e.into()),
    };
    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_DISPOSITION, book.content_disposition(disposition))
        .header(header::CONTENT_LENGTH, content.size)
        .body(body)
        .unwrap_or_else(|_| Response::default()))
}

/// Book cover image.
pub async fn book_cover(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response<Body>> {
    let (data, mime) = state.catalog.cover_image(&id)?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CACHE_CONTROL, "public, max-age=86400")
        .body(Body::from(data))
        .unwrap_or_else(|_| Response::default()))
}

// ============================================================================
// RATING API
// ============================================================================

/// Rating request.
#[derive(Debug, Deserialize)]
pub struct RateRequest {
    rating: Option<serde_json::Value>,
    review: Option<serde_json::Value>,
}

/// Saved rating with the book's refreshed aggregate.
#[derive(Debug, Serialize)]
pub struct RateResponse {
    #[serde(flatten)]
    rating: Rating,
    book: BookAggregate,
}

/// Accept integers and integer strings, as form-encoded clients send both.
fn rating_value(value: Option<serde_json::Value>) -> Result<Option<i64>> {
    let invalid =
        || AppError::Validation(FieldErrors::single("rating", "The rating must be an integer."));

    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
        Some(serde_json::Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn review_value(value: Option<serde_json::Value>) -> Result<Option<String>> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(AppError::Validation(FieldErrors::single(
            "review",
            "The review must be a string.",
        ))),
    }
}

/// Rate a book.
pub async fn book_rate(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    body: std::result::Result<Json<RateRequest>, JsonRejection>,
) -> ApiResult<RateResponse> {
    let req = json_body(body)?;
    let rating = rating_value(req.rating)?;
    let review = review_value(req.review)?;

    let saved = state
        .ratings
        .upsert_rating(&caller.user.id, &id, rating, review, now_timestamp())?;

    Ok(ApiResponse::with_message(
        "Rating saved successfully",
        RateResponse {
            rating: saved.rating,
            book: saved.book,
        },
    ))
}

/// Remove the caller's rating.
pub async fn book_unrate(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<BookAggregate> {
    let aggregate = state.ratings.remove_rating(&caller.user.id, &id)?;
    Ok(ApiResponse::with_message("Rating deleted successfully", aggregate))
}

// ============================================================================
// SUBSCRIPTION API
// ============================================================================

/// Start a premium period.
pub async fn subscription_subscribe(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> ApiResult<SubscriptionStatus> {
    let now = now_timestamp();
    let mut user = caller.user;
    state.entitlements.subscribe(&mut user, now)?;
    let status = state.entitlements.status(&mut user, now)?;

    Ok(ApiResponse::with_message(
        "Premium subscription activated successfully!",
        status,
    ))
}

/// Cancel the subscription.
pub async fn subscription_cancel(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> ApiResult<()> {
    let mut user = caller.user;
    state.entitlements.cancel(&mut user)?;
    Ok(ApiResponse::message("Subscription cancelled successfully"))
}

/// Current subscription state.
pub async fn subscription_status(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> ApiResult<SubscriptionStatus> {
    let mut user = caller.user;
    let status = state.entitlements.status(&mut user, now_timestamp())?;
    Ok(ApiResponse::data(status))
}

// ============================================================================
// ADMIN API
// ============================================================================

/// Collect the admin book form from a multipart body.
async fn read_book_form(mut multipart: Multipart) -> Result<BookForm> {
    let mut form = BookForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "pdf_file" | "cover_image" => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;

                let upload = Some(UploadedFile {
                    file_name,
                    content_type,
                    data: data.to_vec(),
                });
                if name == "pdf_file" {
                    form.pdf_file = upload;
                } else {
                    form.cover_image = upload;
                }
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.body_text()))?;

                let slot = match name.as_str() {
                    "title" => &mut form.title,
                    "author" => &mut form.author,
                    "description" => &mut form.description,
                    "pages" => &mut form.pages,
                    "isbn" => &mut form.isbn,
                    "published_year" => &mut form.published_year,
                    "is_premium" => &mut form.is_premium,
                    _ => continue,
                };
                *slot = Some(value);
            }
        }
    }

    Ok(form)
}

/// Create a book.
pub async fn admin_create_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<BookView>>)> {
    let form = read_book_form(multipart).await?;
    let book = state.books.create(form, now_timestamp())?;

    tracing::debug!(admin_id = %admin.id, book_id = %book.id, "Admin created book");
    let view = state.catalog.links().view(book, None);

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message("Book created successfully", view),
    ))
}

/// Update a book.
pub async fn admin_update_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<BookView> {
    let form = read_book_form(multipart).await?;
    let book = state.books.update(&id, form, now_timestamp())?;

    tracing::debug!(admin_id = %admin.id, book_id = %book.id, "Admin updated book");
    let view = state.catalog.links().view(book, None);

    Ok(ApiResponse::with_message("Book updated successfully", view))
}

/// Delete a book.
pub async fn admin_delete_book(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.books.delete(&id)?;

    tracing::debug!(admin_id = %admin.id, book_id = %id, "Admin deleted book");
    Ok(ApiResponse::message("Book deleted successfully"))
}
