use crate::api::handlers::{csrf, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Router that also drives the `OpenAPI` document.
///
/// Endpoints registered with `.routes(routes!(...))` are both served and
/// documented.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut health_tag = Tag::new("health");
    health_tag.description = Some("Service and store status".to_string());
    let mut security_tag = Tag::new("security");
    security_tag.description = Some("One-time token issuance".to_string());
    // utoipa-axum 0.1 has no `get_openapi_mut`; `routes` never touches tags,
    // so setting them up front yields the same document.
    let mut openapi = cargo_openapi();
    openapi.tags = Some(vec![health_tag, security_tag]);

    OpenApiRouter::with_openapi(openapi)
        .routes(routes!(health::health))
        .routes(routes!(csrf::csrf))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(non_empty(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact(env!("CARGO_PKG_AUTHORS"));
    info.license = non_empty(env!("CARGO_PKG_LICENSE")).map(|identifier| {
        let mut license = License::new(identifier);
        license.identifier = Some(identifier.to_string());
        license
    });

    OpenApiBuilder::new().info(info).build()
}

// Cargo joins authors with `:` and each may read "Name <email>".
fn cargo_contact(authors: &str) -> Option<Contact> {
    let primary = authors.split(':').next().and_then(non_empty)?;

    let (name, email) = match primary.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (Some(primary), None),
    };

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn contact_splits_name_and_email() {
        let contact = cargo_contact("Team Custode <team@custode.dev>:Other <o@x.dev>").unwrap();
        assert_eq!(contact.name.as_deref(), Some("Team Custode"));
        assert_eq!(contact.email.as_deref(), Some("team@custode.dev"));

        let bare = cargo_contact("Solo").unwrap();
        assert_eq!(bare.name.as_deref(), Some("Solo"));
        assert!(bare.email.is_none());

        assert!(cargo_contact("  ").is_none());
    }

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/csrf"));
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }
}
