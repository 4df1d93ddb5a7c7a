//! # Docker Config Tests
//!
//! Payload format compatibility with image pull clients.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use registry_credentials_controller::controller::{DockerAuth, DockerConfig};
use registry_credentials_controller::provider::{ecr_registry_host, encode_basic_auth};

#[test]
fn test_basic_auth_token_decodes_to_user_and_password() {
    let token = encode_basic_auth("alice", "s3cret");
    let decoded = STANDARD.decode(token.as_bytes()).unwrap();
    assert_eq!(decoded, b"alice:s3cret");
}

#[test]
fn test_payload_is_compact_docker_config_json() {
    let mut config = DockerConfig::default();
    config.auths.insert(
        "https://index.docker.io/v1/".to_string(),
        DockerAuth {
            auth: "YWxpY2U6czNjcmV0".to_string(),
        },
    );

    let json = String::from_utf8(config.to_json().unwrap()).unwrap();
    assert_eq!(
        json,
        r#"{"auths":{"https://index.docker.io/v1/":{"auth":"YWxpY2U6czNjcmV0"}}}"#
    );
}

#[test]
fn test_payload_written_by_other_tools_is_readable() {
    // docker login writes extra fields per entry
    let raw = br#"{
        "auths": {
            "123456789012.dkr.ecr.us-east-1.amazonaws.com": {
                "auth": "QVdTOnRva2Vu",
                "email": "none"
            }
        }
    }"#;

    let config = DockerConfig::from_json(raw).unwrap();
    assert_eq!(
        config.auths["123456789012.dkr.ecr.us-east-1.amazonaws.com"].auth,
        "QVdTOnRva2Vu"
    );
}

#[test]
fn test_hosts_serialize_in_stable_order() {
    let mut config = DockerConfig::default();
    for host in ["zeta.example.com", "alpha.example.com"] {
        config.auths.insert(
            host.to_string(),
            DockerAuth {
                auth: "dG9rZW4=".to_string(),
            },
        );
    }
    let json = String::from_utf8(config.to_json().unwrap()).unwrap();
    assert!(json.find("alpha.example.com").unwrap() < json.find("zeta.example.com").unwrap());
}

#[test]
fn test_ecr_registry_host_shape() {
    assert_eq!(
        ecr_registry_host("123456789012", "us-east-1"),
        "123456789012.dkr.ecr.us-east-1.amazonaws.com"
    );
}
