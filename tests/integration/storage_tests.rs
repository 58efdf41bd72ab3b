//! On-disk state tests.
//!
//! Tests verify:
//! - Registry and catalog file formats
//! - Images survive a restart
//! - No temporary files are left behind by normal operation
//! - The offline audit agrees with state built through the API

use std::collections::BTreeMap;

use axum::http::StatusCode;

use image_vault::{audit, repair};

use super::test_utils::{create_test_jpeg, create_test_png, TestVault};

#[tokio::test]
async fn test_registry_file_format() {
    let vault = TestVault::new().await;
    let alice = vault.register("alice").await;
    let bob = vault.register("bob").await;

    let raw = std::fs::read(vault.root().join("tokens.json")).unwrap();
    let tokens: BTreeMap<String, String> = serde_json::from_slice(&raw).unwrap();

    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens["alice"], alice);
    assert_eq!(tokens["bob"], bob);
}

#[tokio::test]
async fn test_catalog_file_format() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let cat = vault.upload_ok(&token, "cat.png", &create_test_png(8, 8)).await;
    let dog = vault.upload_ok(&token, "dog.jpg", &create_test_jpeg(8, 8)).await;

    let raw = std::fs::read(vault.root().join(&token).join("imagemap.json")).unwrap();
    let catalog: BTreeMap<String, String> = serde_json::from_slice(&raw).unwrap();

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog[&cat], "cat.png");
    assert_eq!(catalog[&dog], "dog.jpg");
}

#[tokio::test]
async fn test_images_survive_restart() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_test_png(20, 20);
    let id = vault.upload_ok(&token, "cat.png", &png).await;

    let vault = vault.restart().await;

    let response = vault.fetch(&token, &id).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), png.as_slice());

    // Conflict detection still sees the persisted catalog.
    let response = vault.upload(&token, "cat.png", &png).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_no_temporary_files_left_behind() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let id = vault.upload_ok(&token, "a.png", &create_test_png(8, 8)).await;
    vault
        .update(&token, &id, "b.jpg", &create_test_jpeg(8, 8))
        .await;
    vault.upload_ok(&token, "c.png", &create_test_png(8, 8)).await;
    vault.delete(&token, &id).await;

    for dir in [vault.root().to_path_buf(), vault.root().join(&token)] {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().into_owned();
            assert!(!name.ends_with(".tmp"), "leftover temp file {}", name);
        }
    }
}

#[tokio::test]
async fn test_audit_clean_after_api_traffic() {
    let vault = TestVault::new().await;
    let alice = vault.register("alice").await;
    let bob = vault.register("bob").await;

    let id = vault.upload_ok(&alice, "a.png", &create_test_png(8, 8)).await;
    vault.upload_ok(&alice, "b.png", &create_test_png(8, 8)).await;
    vault
        .update(&alice, &id, "c.jpg", &create_test_jpeg(8, 8))
        .await;
    vault.upload_ok(&bob, "a.png", &create_test_png(8, 8)).await;

    let report = audit(vault.root()).await.unwrap();
    assert!(report.is_clean(), "{:?}", report);
    assert_eq!(report.namespaces_checked, 2);
    assert_eq!(report.images_checked, 3);
}

#[tokio::test]
async fn test_audit_reports_blob_removed_behind_the_server() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let id = vault.upload_ok(&token, "cat.png", &create_test_png(8, 8)).await;

    std::fs::remove_file(vault.root().join(&token).join("cat.png.gz")).unwrap();

    // The server surfaces the mismatch instead of guessing.
    let response = vault.fetch(&token, &id).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.error_code(), "inconsistent");

    let report = audit(vault.root()).await.unwrap();
    assert_eq!(report.dangling_entries.len(), 1);
    assert_eq!(report.dangling_entries[0].image_id.as_str(), id);
    assert_eq!(report.unrepairable_count(), 1);

    // Dangling entries are reported, never rewritten.
    let summary = repair(vault.root(), &report).await.unwrap();
    assert_eq!(summary.orphan_blobs_removed, 0);
    let after = audit(vault.root()).await.unwrap();
    assert_eq!(after.dangling_entries.len(), 1);
}

#[tokio::test]
async fn test_missing_namespace_rejects_token_until_repaired() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    std::fs::remove_dir(vault.root().join(&token)).unwrap();
    assert_eq!(vault.list(&token).await.status, StatusCode::UNAUTHORIZED);

    let report = audit(vault.root()).await.unwrap();
    assert_eq!(report.missing_namespaces.len(), 1);
    repair(vault.root(), &report).await.unwrap();

    let png = create_test_png(8, 8);
    vault.upload_ok(&token, "cat.png", &png).await;
}
