//! Well-known session attribute names.

/// Name of the authenticated principal.
pub const PRINCIPAL_ID: &str = "picketlink.principal";

/// Roles granted to the principal.
pub const ROLES: &str = "picketlink.roles";

/// SAML assertion issued to (IDP) or received by (SP) this session.
pub const ASSERTION: &str = "picketlink.assertion";

/// ID of the assertion to renew instead of issuing a fresh one.
pub const ASSERTION_ID: &str = "picketlink.assertion.id";

/// Attributes collected by the IDP attribute manager.
pub const ATTRIBUTES: &str = "picketlink.attributes";

/// Attributes received by the SP, keyed by name or friendly name.
pub const SESSION_ATTRIBUTE_MAP: &str = "picketlink.sessionAttributeMap";

/// ID of the outstanding `AuthnRequest`, checked against `InResponseTo`.
pub const AUTH_REQUEST_ID: &str = "picketlink.authRequestId";

/// Path the user asked for before being challenged.
pub const AUTHENTICATION_ORIGINAL_PATH: &str = "picketlink.authc.originalPath";

/// Account bound to the session by the security filter.
pub const ACCOUNT: &str = "picketlink.account";
