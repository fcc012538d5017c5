/*!
Unit tests for the S3 adapter's error mapping.
*/

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::get_object::GetObjectError;

use super::s3::{classify_service_code, map_store_error};
use crate::FileVaultError;

#[test]
fn timeout_errors_map_to_storage_with_the_key() {
    let error = SdkError::<GetObjectError>::timeout_error("request timed out");
    let mapped = map_store_error("get_object", error, "logs/abc.zip");

    match mapped {
        FileVaultError::Storage(msg) => {
            assert!(msg.contains("timed out"));
            assert!(msg.contains("logs/abc.zip"));
        }
        other => panic!("expected storage error, got {other:?}"),
    }
}

#[test]
fn missing_key_and_version_codes_are_not_found() {
    let mapped = classify_service_code("get_object", "NoSuchKey", "logs/abc.zip", None);
    assert!(matches!(mapped, FileVaultError::NotFound(_)));
    assert!(mapped.to_string().contains("logs/abc.zip"));

    let mapped = classify_service_code("get_object", "NoSuchVersion", "logs/abc.zip", None);
    assert!(matches!(mapped, FileVaultError::NotFound(_)));
}

#[test]
fn missing_bucket_code_is_distinguished() {
    let mapped = classify_service_code("list_objects", "NoSuchBucket", "", None);
    assert!(matches!(mapped, FileVaultError::BucketNotFound(_)));
}

#[test]
fn credential_codes_map_to_storage() {
    for code in ["AccessDenied", "Forbidden", "InvalidAccessKeyId", "SignatureDoesNotMatch"] {
        let mapped = classify_service_code("put_object", code, "k", None);
        match mapped {
            FileVaultError::Storage(msg) => assert!(msg.contains("access denied")),
            other => panic!("expected storage error for {code}, got {other:?}"),
        }
    }
}

#[test]
fn unknown_codes_keep_code_and_message() {
    let mapped = classify_service_code("put_object", "SlowDown", "k", Some("reduce request rate"));
    match mapped {
        FileVaultError::Storage(msg) => {
            assert!(msg.contains("SlowDown"));
            assert!(msg.contains("reduce request rate"));
        }
        other => panic!("expected storage error, got {other:?}"),
    }
}

#[test]
fn mapped_errors_are_never_silently_recoverable() {
    let mapped = classify_service_code("get_object", "NoSuchKey", "k", None);
    assert!(!mapped.is_recoverable());

    let mapped = classify_service_code("put_object", "AccessDenied", "k", None);
    assert!(!mapped.is_recoverable());
}
