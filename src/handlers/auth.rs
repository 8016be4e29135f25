use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::issue_access_token,
    confirmation::ConfirmationCodes,
    error::{AppError, AppResult},
    handlers::ValidatedJson,
    mailer::OutgoingMessage,
    models::{NewUser, Role, SignupRequest, TokenRequest, TokenResponse, User},
};

/// Finds the user a signup refers to, or creates it.
///
/// The exact `(username, email)` pair of an existing user is accepted again so a user
/// who lost the code can ask for a new one. Any other overlap is a conflict.
async fn find_or_create_signup_user(state: &AppState, payload: SignupRequest) -> AppResult<User> {
    let by_username = state.repo.find_user_by_username(&payload.username).await?;
    let by_email = state.repo.find_user_by_email(&payload.email).await?;

    match (by_username, by_email) {
        (Some(user), Some(other)) if user.id == other.id => Ok(user),
        (Some(_), _) => Err(AppError::field(
            "username",
            "A user with that username already exists",
        )),
        (None, Some(_)) => Err(AppError::field("email", "A user with that email already exists")),
        (None, None) => {
            let user = state
                .repo
                .create_user(NewUser {
                    username: payload.username,
                    email: payload.email,
                    first_name: String::new(),
                    last_name: String::new(),
                    bio: String::new(),
                    role: Role::User,
                    confirmation_secret: ConfirmationCodes::new_user_secret(),
                })
                .await?;
            tracing::info!(user_id = %user.id, username = %user.username, "user registered");
            Ok(user)
        }
    }
}

fn invalid_code() -> AppError {
    AppError::field("confirmation_code", "Invalid confirmation code")
}

/// signup
///
/// Registers a user (or re-issues a code for an existing identical pair) and mails a
/// confirmation code.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Confirmation code sent", body = SignupRequest),
        (status = 400, description = "Invalid data or username/email taken")
    ),
    tag = "auth"
)]
pub async fn signup(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<SignupRequest>,
) -> AppResult<Json<SignupRequest>> {
    let user = find_or_create_signup_user(&state, payload).await?;

    let code = state.codes.issue(&user);
    state
        .mailer
        .send(OutgoingMessage::confirmation_code(&user.email, &code))
        .await?;
    tracing::info!(username = %user.username, "confirmation code issued");

    Ok(Json(SignupRequest {
        username: user.username,
        email: user.email,
    }))
}

/// token
///
/// Exchanges a confirmation code for an access token. A successful exchange
/// confirms the user and rotates its code secret, so each code works once.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Access token", body = TokenResponse),
        (status = 400, description = "Missing fields or invalid confirmation code"),
        (status = 404, description = "Unknown username")
    ),
    tag = "auth"
)]
pub async fn token(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<TokenRequest>,
) -> AppResult<Json<TokenResponse>> {
    let user = state
        .repo
        .find_user_by_username(&payload.username)
        .await?
        .ok_or_else(|| AppError::not_found("User not found."))?;

    if !state.codes.verify(&user, &payload.confirmation_code) {
        tracing::info!(username = %user.username, "confirmation code rejected");
        return Err(invalid_code());
    }

    // The swap only succeeds against the secret the code was verified with; a
    // concurrent exchange of the same code loses here.
    let Some(user) = state
        .repo
        .confirm_user(
            user.id,
            &user.confirmation_secret,
            ConfirmationCodes::new_user_secret(),
        )
        .await?
    else {
        tracing::info!(username = %user.username, "confirmation code already redeemed");
        return Err(invalid_code());
    };

    let token = issue_access_token(&state.config, user.id)?;
    tracing::info!(user_id = %user.id, "access token issued");
    Ok(Json(TokenResponse { token }))
}
