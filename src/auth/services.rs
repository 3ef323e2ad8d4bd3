use tracing::{info, warn};

use crate::{
    auth::{
        dto::{LoginRequest, RegisterRequest},
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_dummy_blocking, verify_password_blocking},
        repo::{RepoError, UserRepo},
        repo_types::{check_identity, NewUser, User},
    },
    error::AppError,
};

const REGISTER_FAILED: &str = "Error registering user";
const LOGIN_FAILED: &str = "Error logging in";

/// Creates a user unless the username or email is already taken.
pub async fn register_user(repo: &dyn UserRepo, req: RegisterRequest) -> Result<User, AppError> {
    let email =
        check_identity(&req.username, &req.email, &req.password).map_err(AppError::Validation)?;

    let existing = repo
        .find_by_username_or_email(&req.username, &email)
        .await
        .map_err(AppError::internal(REGISTER_FAILED))?;
    if existing.is_some() {
        warn!(username = %req.username, "username or email already registered");
        return Err(AppError::Duplicate);
    }

    let password_hash = hash_password_blocking(req.password)
        .await
        .map_err(AppError::internal(REGISTER_FAILED))?;

    let user = repo
        .create(NewUser {
            username: req.username,
            email,
            password_hash,
        })
        .await
        .map_err(|e| match e {
            RepoError::Duplicate => {
                warn!("concurrent registration lost the unique constraint race");
                AppError::Duplicate
            }
            RepoError::Other(source) => AppError::internal(REGISTER_FAILED)(source),
        })?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Checks a username/password pair and issues a token.
///
/// Unknown usernames and wrong passwords both yield
/// [`AppError::InvalidCredentials`].
pub async fn login_user(
    repo: &dyn UserRepo,
    keys: &JwtKeys,
    req: LoginRequest,
) -> Result<String, AppError> {
    let user = repo
        .find_by_username(&req.username)
        .await
        .map_err(AppError::internal(LOGIN_FAILED))?;

    let Some(user) = user else {
        verify_dummy_blocking(req.password)
            .await
            .map_err(AppError::internal(LOGIN_FAILED))?;
        warn!(username = %req.username, "login unknown username");
        return Err(AppError::InvalidCredentials);
    };

    let ok = verify_password_blocking(req.password, user.password_hash.clone())
        .await
        .map_err(AppError::internal(LOGIN_FAILED))?;
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = keys
        .sign(&user.username, user.role)
        .map_err(AppError::internal(LOGIN_FAILED))?;
    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(token)
}

/// Loads the user a verified token refers to.
pub async fn current_user(repo: &dyn UserRepo, username: &str) -> Result<User, AppError> {
    repo.find_by_username(username)
        .await
        .map_err(AppError::internal("Error loading user"))?
        .ok_or(AppError::Unauthorized("User not found"))
}
