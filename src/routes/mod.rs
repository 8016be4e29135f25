/// Router Module Index
///
/// One module per resource group. Each group carries a single access `Policy`,
/// applied as a route layer in `create_router`, so a route cannot be registered
/// without deciding who may call it.

/// Open endpoints of the confirmation-code login flow.
pub mod auth;

/// Categories, genres and titles (`IsAdmin OR ReadOnly`).
pub mod catalog;

/// Reviews and comments nested under titles (`IsAdmin OR IsModerator OR IsAuthorOrReadOnly`).
pub mod feedback;

/// Own profile (`IsAuthenticated`) and admin user management (`IsAdmin`).
pub mod users;
