//! Integration tests for the login / request / logout cycle against a mock backend.

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Unsigned JWT expiring in 2100.
const VALID_ACCESS: &str =
    "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.eyJleHAiOjQxMDI0NDQ4MDAsInVzZXJfaWQiOjN9.sig";

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn profile() -> Value {
    json!({
        "id": 3,
        "name": "Ana",
        "last_name": "Diaz",
        "phone_number": "+5355555555",
        "email": "ana@example.com",
        "role": "admin",
        "is_staff": true,
        "is_superuser": false,
        "is_active": true
    })
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/arye_system/auth/"))
        .and(body_json(json!({ "phone_number": "+5355555555", "password": "secret1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access": VALID_ACCESS,
            "refresh": "R1",
            "user": profile()
        })))
        .expect(1)
        .mount(server)
        .await;
}

fn login(home: &TempDir, server: &MockServer) {
    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .env("TRUCKPARTS_API_URL", server.uri())
        .args(["login", "--phone", "+5355555555", "--password", "secret1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as Ana Diaz"));
}

#[tokio::test]
async fn test_login_request_logout_cycle() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/arye_system/orders/"))
        .and(header("authorization", format!("Bearer {VALID_ACCESS}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/arye_system/logout/"))
        .and(body_json(json!({ "refresh_token": "R1" })))
        .respond_with(ResponseTemplate::new(205))
        .expect(1)
        .mount(&server)
        .await;

    login(&home, &server);

    let storage = fs::read_to_string(home.path().join("storage.json")).unwrap();
    assert!(storage.contains("access_token"));
    assert!(!storage.contains("Ana"), "profile must not be stored in clear text");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(home.path().join("storage.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as Ana Diaz (admin)"))
        .stdout(predicate::str::contains("valid until 2100-01-01"))
        .stdout(predicate::str::contains("Admin access:  yes"));

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .env("TRUCKPARTS_API_URL", server.uri())
        .args(["request", "get", "/orders/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": 1"));

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .env("TRUCKPARTS_API_URL", server.uri())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in."));
}

#[tokio::test]
async fn test_request_retries_after_refresh() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/arye_system/orders/"))
        .and(header("authorization", format!("Bearer {VALID_ACCESS}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/arye_system/auth/refresh/"))
        .and(body_json(json!({ "refresh": "R1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A2",
            "refresh_token": "R2"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/arye_system/orders/"))
        .and(header("authorization", "Bearer A2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    login(&home, &server);

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .env("TRUCKPARTS_API_URL", server.uri())
        .args(["request", "GET", "/orders/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 0"));

    let storage: Value =
        serde_json::from_str(&fs::read_to_string(home.path().join("storage.json")).unwrap())
            .unwrap();
    assert_eq!(storage["access_token"], "A2");
    assert_eq!(storage["access"], "A2");
    assert_eq!(storage["refresh_token"], "R2");
}

#[tokio::test]
async fn test_rejected_refresh_ends_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/arye_system/orders/"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/arye_system/auth/refresh/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "detail": "Token is invalid or expired",
            "code": "token_not_valid"
        })))
        .expect(1)
        .mount(&server)
        .await;

    login(&home, &server);

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .env("TRUCKPARTS_API_URL", server.uri())
        .args(["request", "get", "/orders/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session expired"))
        .stderr(predicate::str::contains(
            "Session ended. Run `truckparts login` to sign in again.",
        ));

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Not logged in."));
}

#[tokio::test]
async fn test_forbidden_request_keeps_session() {
    if !can_bind_localhost() {
        eprintln!("Skipping: cannot bind localhost TCP port in this environment.");
        return;
    }
    let home = TempDir::new().unwrap();
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/arye_system/products/7/"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "detail": "You do not have permission to perform this action."
        })))
        .mount(&server)
        .await;

    login(&home, &server);

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .env("TRUCKPARTS_API_URL", server.uri())
        .args(["request", "delete", "/products/7/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error: Access denied"))
        .stderr(predicate::str::contains(
            "You do not have permission to perform this action.",
        ));

    cargo_bin_cmd!("truckparts")
        .env("TRUCKPARTS_HOME", home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as Ana Diaz"));
}
