//! Tests for hypermedia endpoint discovery.

mod common;

use common::*;
use crestwatch::crest::endpoints::{AUTH_ENDPOINT, CHARACTER, DECODE, LOCATION};
use crestwatch::crest::{CrestHttp, EndpointResolver, EndpointTable};
use crestwatch::error::SessionError;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn resolver(crest: &CrestFixture) -> EndpointResolver {
    let http = CrestHttp::new(&crest.config()).unwrap();
    EndpointResolver::new(http, crest.url("/"))
}

#[tokio::test]
async fn public_endpoints_are_loaded_from_the_root_document() {
    let crest = CrestFixture::start().await;
    crest.mount_public_root().await;
    let mut resolver = resolver(&crest);

    let table = resolver.load_public_endpoints().await.unwrap();

    assert_eq!(table.len(), 2);
    assert_eq!(table.get(DECODE), Some(crest.url("/decode/").as_str()));
    assert_eq!(table.get(AUTH_ENDPOINT), Some(crest.url("/oauth/token").as_str()));
}

#[tokio::test]
async fn authenticated_chain_repairs_missing_decode_once() {
    let crest = CrestFixture::start().await;
    crest.public_root_mock().expect(1).mount(&crest.server).await;
    crest.mount_authenticated(in_system("Jita")).await;
    let mut resolver = resolver(&crest);

    let endpoints = resolver.resolve_authenticated_endpoints(BEARER).await.unwrap();

    assert_eq!(endpoints.character, crest.url("/characters/90000001/"));
    assert_eq!(endpoints.location, crest.url("/characters/90000001/location/"));
    assert_eq!(resolver.get(CHARACTER), Some(endpoints.character.as_str()));
    assert_eq!(resolver.get(LOCATION), Some(endpoints.location.as_str()));

    // The table now has decode, so a second resolve skips the public root.
    resolver.resolve_authenticated_endpoints(BEARER).await.unwrap();
}

#[tokio::test]
async fn known_table_skips_the_public_root() {
    let crest = CrestFixture::start().await;
    crest.public_root_mock().expect(0).mount(&crest.server).await;
    crest.mount_authenticated(in_system("Jita")).await;
    let mut table = EndpointTable::new();
    table.insert(DECODE, crest.url("/decode/"));
    let mut resolver = resolver(&crest).with_table(table);

    let endpoints = resolver.resolve_authenticated_endpoints(BEARER).await.unwrap();

    assert_eq!(endpoints.character, crest.url("/characters/90000001/"));
}

#[tokio::test]
async fn root_without_decode_is_a_discovery_error() {
    let crest = CrestFixture::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authEndpoint": {"href": crest.url("/oauth/token")}
        })))
        .expect(1)
        .mount(&crest.server)
        .await;
    let mut resolver = resolver(&crest);

    let result = resolver.resolve_authenticated_endpoints(BEARER).await;

    assert!(matches!(result, Err(SessionError::Discovery(_))));
    assert!(result.unwrap_err().is_retryable());
}

#[tokio::test]
async fn undecodable_root_is_a_discovery_error() {
    let crest = CrestFixture::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&crest.server)
        .await;
    let mut resolver = resolver(&crest);

    let result = resolver.load_public_endpoints().await;

    assert!(matches!(result, Err(SessionError::Discovery(_))));
}

#[tokio::test]
async fn clear_authenticated_keeps_public_relations() {
    let crest = CrestFixture::start().await;
    crest.mount_public_root().await;
    crest.mount_authenticated(in_system("Jita")).await;
    let mut resolver = resolver(&crest);
    resolver.resolve_authenticated_endpoints(BEARER).await.unwrap();

    resolver.clear_authenticated();

    assert!(resolver.get(CHARACTER).is_none());
    assert!(resolver.get(LOCATION).is_none());
    assert!(resolver.table().contains(DECODE));
}
