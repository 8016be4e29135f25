//! Role-based access rules and the per-route policies built from them.
//!
//! A `Policy` grants a request when ANY of its rules grants it. Request-level
//! checks run in the `enforce` route layer; object-level checks (authorship) run in
//! handlers once the object is loaded, through `Policy::check_object`.

use std::{fmt, sync::Arc};

use axum::{
    extract::{OptionalFromRequestParts, Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    models::Role,
};

/// RequestContext
///
/// What a rule may look at: the HTTP method and the caller, if authenticated.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub method: &'a Method,
    pub user: Option<&'a AuthUser>,
}

impl<'a> RequestContext<'a> {
    pub fn new(method: &'a Method, user: Option<&'a AuthUser>) -> Self {
        Self { method, user }
    }

    /// GET, HEAD and OPTIONS.
    pub fn is_safe(&self) -> bool {
        matches!(*self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    fn has_role(&self, role: Role) -> bool {
        self.user.is_some_and(|user| user.role == role)
    }
}

/// Rule
///
/// One authorization rule. `has_object_permission` is only consulted for rules whose
/// `has_permission` already passed, and defaults to the request-level answer.
pub trait Rule: Send + Sync + fmt::Debug {
    fn has_permission(&self, ctx: &RequestContext<'_>) -> bool;

    fn has_object_permission(&self, ctx: &RequestContext<'_>, _author_id: Uuid) -> bool {
        self.has_permission(ctx)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IsAdmin;

impl Rule for IsAdmin {
    fn has_permission(&self, ctx: &RequestContext<'_>) -> bool {
        ctx.has_role(Role::Admin)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IsModerator;

impl Rule for IsModerator {
    fn has_permission(&self, ctx: &RequestContext<'_>) -> bool {
        ctx.has_role(Role::Moderator)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IsAuthenticated;

impl Rule for IsAuthenticated {
    fn has_permission(&self, ctx: &RequestContext<'_>) -> bool {
        ctx.user.is_some()
    }
}

/// Safe methods only, anonymous callers included.
#[derive(Debug, Clone, Copy)]
pub struct ReadOnly;

impl Rule for ReadOnly {
    fn has_permission(&self, ctx: &RequestContext<'_>) -> bool {
        ctx.is_safe()
    }
}

/// Anyone may read, any authenticated user may create, only the author may change.
#[derive(Debug, Clone, Copy)]
pub struct IsAuthorOrReadOnly;

impl Rule for IsAuthorOrReadOnly {
    fn has_permission(&self, ctx: &RequestContext<'_>) -> bool {
        ctx.is_safe() || ctx.user.is_some()
    }

    fn has_object_permission(&self, ctx: &RequestContext<'_>, author_id: Uuid) -> bool {
        ctx.is_safe() || ctx.user.is_some_and(|user| user.id == author_id)
    }
}

/// Policy
///
/// An OR-combination of rules attached to a route group.
#[derive(Clone)]
pub struct Policy {
    name: &'static str,
    rules: Vec<Arc<dyn Rule>>,
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("rules", &self.rules)
            .finish()
    }
}

impl Policy {
    pub fn any_of(name: &'static str, rules: Vec<Arc<dyn Rule>>) -> Self {
        Self { name, rules }
    }

    /// Categories, genres and titles.
    pub fn admin_or_read_only() -> Self {
        Self::any_of("admin_or_read_only", vec![Arc::new(IsAdmin), Arc::new(ReadOnly)])
    }

    /// Reviews and comments.
    pub fn staff_or_author() -> Self {
        Self::any_of(
            "staff_or_author",
            vec![
                Arc::new(IsAdmin),
                Arc::new(IsModerator),
                Arc::new(IsAuthorOrReadOnly),
            ],
        )
    }

    /// Admin user management.
    pub fn admin_only() -> Self {
        Self::any_of("admin_only", vec![Arc::new(IsAdmin)])
    }

    /// Own-profile endpoints.
    pub fn authenticated() -> Self {
        Self::any_of("authenticated", vec![Arc::new(IsAuthenticated)])
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request-level check: 401 for anonymous callers, 403 for authenticated ones.
    pub fn check(&self, ctx: &RequestContext<'_>) -> AppResult<()> {
        if self.rules.iter().any(|rule| rule.has_permission(ctx)) {
            return Ok(());
        }
        Err(denial(ctx))
    }

    /// Object-level check against the object's author.
    pub fn check_object(&self, ctx: &RequestContext<'_>, author_id: Uuid) -> AppResult<()> {
        let granted = self.rules.iter().any(|rule| {
            rule.has_permission(ctx) && rule.has_object_permission(ctx, author_id)
        });
        if granted {
            return Ok(());
        }
        Err(denial(ctx))
    }
}

fn denial(ctx: &RequestContext<'_>) -> AppError {
    match ctx.user {
        None => AppError::Unauthorized,
        Some(_) => AppError::PermissionDenied,
    }
}

/// enforce
///
/// Route-layer middleware applying a `Policy` before the handler runs. The resolved
/// user is stored in the request extensions so the handler's `AuthUser` extractor
/// does not hit the repository a second time.
pub async fn enforce(
    State((state, policy)): State<(AppState, Policy)>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let user =
        <AuthUser as OptionalFromRequestParts<AppState>>::from_request_parts(&mut parts, &state)
            .await?;

    let ctx = RequestContext::new(&parts.method, user.as_ref());
    if let Err(err) = policy.check(&ctx) {
        tracing::info!(
            policy = policy.name(),
            method = %parts.method,
            user = ?user.as_ref().map(|u| &u.username),
            "request denied by policy"
        );
        return Err(err);
    }

    if let Some(user) = user {
        parts.extensions.insert(user);
    }
    Ok(next.run(Request::from_parts(parts, body)).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            username: format!("{}-user", role.as_str()),
            role,
        }
    }

    #[test]
    fn admin_or_read_only() {
        let policy = Policy::admin_or_read_only();
        let admin = user(Role::Admin);
        let moderator = user(Role::Moderator);

        assert!(policy.check(&RequestContext::new(&Method::GET, None)).is_ok());
        assert!(matches!(
            policy.check(&RequestContext::new(&Method::POST, None)),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            policy.check(&RequestContext::new(&Method::POST, Some(&moderator))),
            Err(AppError::PermissionDenied)
        ));
        assert!(policy.check(&RequestContext::new(&Method::DELETE, Some(&admin))).is_ok());
    }

    #[test]
    fn only_author_or_staff_may_change_feedback() {
        let policy = Policy::staff_or_author();
        let author = user(Role::User);
        let stranger = user(Role::User);
        let moderator = user(Role::Moderator);
        let admin = user(Role::Admin);

        let patch = |who: &AuthUser| {
            policy.check_object(&RequestContext::new(&Method::PATCH, Some(who)), author.id)
        };
        assert!(patch(&author).is_ok());
        assert!(matches!(patch(&stranger), Err(AppError::PermissionDenied)));
        assert!(patch(&moderator).is_ok());
        assert!(patch(&admin).is_ok());

        // Anyone may read, authenticated users may create.
        assert!(
            policy
                .check_object(&RequestContext::new(&Method::GET, None), author.id)
                .is_ok()
        );
        assert!(
            policy
                .check(&RequestContext::new(&Method::POST, Some(&stranger)))
                .is_ok()
        );
        assert!(matches!(
            policy.check(&RequestContext::new(&Method::POST, None)),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn admin_only_rejects_moderators() {
        let policy = Policy::admin_only();
        assert!(matches!(
            policy.check(&RequestContext::new(&Method::GET, Some(&user(Role::Moderator)))),
            Err(AppError::PermissionDenied)
        ));
        assert!(
            policy
                .check(&RequestContext::new(&Method::GET, Some(&user(Role::Admin))))
                .is_ok()
        );
    }

    #[test]
    fn authenticated_allows_any_role() {
        let policy = Policy::authenticated();
        assert!(
            policy
                .check(&RequestContext::new(&Method::PATCH, Some(&user(Role::User))))
                .is_ok()
        );
        assert!(policy.check(&RequestContext::new(&Method::GET, None)).is_err());
    }
}
