//! API integration tests for image operations and error handling.
//!
//! Tests verify:
//! - Upload and download of PNG, JPEG and GIF with the right headers
//! - Listing, update (rename, same name, conflict) and delete
//! - Error cases (unknown token, unknown id, bad content, bad filename)
//! - HTTP response codes and error bodies
//! - CORS origin filtering

use axum::http::{Method, StatusCode};

use image_vault::RouterConfig;

use super::test_utils::{
    create_noise_png, create_test_gif, create_test_jpeg, create_test_png, empty_request, is_image_id,
    multipart_request, Part, TestVault,
};

// =============================================================================
// Upload and Download
// =============================================================================

#[tokio::test]
async fn test_upload_and_get_each_format() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let cases = [
        ("cat.png", create_test_png(32, 24), "image/png"),
        ("dog.jpg", create_test_jpeg(40, 30), "image/jpeg"),
        ("fish.gif", create_test_gif(16, 16), "image/gif"),
    ];

    for (filename, data, mime) in &cases {
        let id = vault.upload_ok(&token, filename, data).await;
        assert!(is_image_id(&id), "unexpected id shape: {}", id);

        let response = vault.fetch(&token, &id).await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header("content-type"), *mime);
        assert_eq!(response.header("content-length"), data.len().to_string());
        assert_eq!(
            response.header("content-disposition"),
            format!("inline; filename=\"{}\"", filename)
        );
        assert_eq!(response.body.as_ref(), data.as_slice());
    }
}

#[tokio::test]
async fn test_upload_stores_compressed_blob() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_test_png(64, 64);

    vault.upload_ok(&token, "cat.png", &png).await;

    assert_eq!(vault.blob_names(&token), vec!["cat.png.gz".to_string()]);
    let stored = std::fs::read(vault.root().join(&token).join("cat.png.gz")).unwrap();
    assert_eq!(&stored[..2], &[0x1f, 0x8b]);
}

#[tokio::test]
async fn test_large_upload_streams_back_intact() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_noise_png(256, 256);
    assert!(png.len() > 64 * 1024);

    let id = vault.upload_ok(&token, "big.png", &png).await;
    let response = vault.fetch(&token, &id).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_ref(), png.as_slice());
}

#[tokio::test]
async fn test_upload_uses_first_file_field() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_test_png(8, 8);
    let jpeg = create_test_jpeg(8, 8);

    let response = vault
        .send(multipart_request(
            Method::POST,
            &format!("/imageapi/token/{}/upload-image/", token),
            &[
                Part::Text {
                    name: "note",
                    value: "ignored",
                },
                Part::file("first.png", &png),
                Part::file("second.jpg", &jpeg),
            ],
        ))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    assert_eq!(vault.blob_names(&token), vec!["first.png.gz".to_string()]);
}

#[tokio::test]
async fn test_upload_without_file_is_no_content() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let response = vault
        .send(multipart_request(
            Method::POST,
            &format!("/imageapi/token/{}/upload-image/", token),
            &[Part::Text {
                name: "note",
                value: "no file here",
            }],
        ))
        .await;

    assert_eq!(response.status, StatusCode::NO_CONTENT);
    assert!(response.body.is_empty());
    assert!(vault.blob_names(&token).is_empty());
}

#[tokio::test]
async fn test_upload_strips_client_directories() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_test_png(8, 8);

    let id = vault
        .upload_ok(&token, "photos/2024/cat.png", &png)
        .await;

    let listing = vault.list(&token).await.json();
    assert_eq!(listing["images"]["cat.png"], id.as_str());
}

// =============================================================================
// Upload Rejections
// =============================================================================

#[tokio::test]
async fn test_upload_unrecognized_file_type() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let response = vault
        .upload(&token, "notes.png", b"just some text, not an image")
        .await;

    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(response.error_code(), "unrecognized_file_type");
    assert!(vault.blob_names(&token).is_empty());
    assert_eq!(vault.list(&token).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejected_upload_keeps_catalog_bytes() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    vault.upload_ok(&token, "cat.png", &create_test_png(8, 8)).await;

    let catalog_path = vault.root().join(&token).join("imagemap.json");
    let before = std::fs::read(&catalog_path).unwrap();

    let response = vault.upload(&token, "x.txt", b"plain text").await;
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);

    assert_eq!(std::fs::read(&catalog_path).unwrap(), before);
    assert_eq!(vault.blob_names(&token), vec!["cat.png.gz".to_string()]);
}

#[tokio::test]
async fn test_upload_duplicate_filename_conflicts() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_test_png(8, 8);
    let gif = create_test_gif(8, 8);

    let id = vault.upload_ok(&token, "cat.png", &png).await;

    let response = vault.upload(&token, "cat.png", &gif).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.error_code(), "conflict");

    // The first upload is unchanged.
    let fetched = vault.fetch(&token, &id).await;
    assert_eq!(fetched.body.as_ref(), png.as_slice());
    assert_eq!(vault.list(&token).await.json()["images"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_invalid_filename() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_test_png(8, 8);

    let long_name = format!("{}.png", "a".repeat(250));
    for filename in [".hidden.png", "..", long_name.as_str()] {
        let response = vault.upload(&token, filename, &png).await;
        assert_eq!(
            response.status,
            StatusCode::BAD_REQUEST,
            "filename {:?}",
            filename
        );
        assert_eq!(response.error_code(), "invalid_request");
    }
    assert!(vault.blob_names(&token).is_empty());
}

#[tokio::test]
async fn test_upload_over_body_limit() {
    let vault = TestVault::with_config(
        RouterConfig::new()
            .with_tracing(false)
            .with_max_upload_bytes(4096),
    )
    .await;
    let token = vault.register("alice").await;
    let png = create_noise_png(64, 64);
    assert!(png.len() > 4096);

    let response = vault.upload(&token, "big.png", &png).await;
    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(vault.blob_names(&token).is_empty());
}

// =============================================================================
// Tokens on Image Routes
// =============================================================================

#[tokio::test]
async fn test_unknown_token_rejected_on_every_route() {
    let vault = TestVault::new().await;
    let png = create_test_png(8, 8);

    for token in ["AAAAAAAAAA", "short", "..%2F..%2Fx"] {
        let responses = [
            vault.upload(token, "a.png", &png).await,
            vault.fetch(token, "abcd").await,
            vault.list(token).await,
            vault.update(token, "abcd", "a.png", &png).await,
            vault.delete(token, "abcd").await,
        ];
        for response in responses {
            assert_eq!(response.status, StatusCode::UNAUTHORIZED, "token {:?}", token);
            assert_eq!(response.error_code(), "invalid_token");
        }
    }
}

#[tokio::test]
async fn test_unknown_token_wins_over_empty_form() {
    let vault = TestVault::new().await;

    let response = vault
        .send(multipart_request(
            Method::POST,
            "/imageapi/token/AAAAAAAAAA/upload-image/",
            &[Part::Text {
                name: "note",
                value: "no file",
            }],
        ))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_token_wins_over_empty_update_form() {
    let vault = TestVault::new().await;

    let response = vault
        .send(multipart_request(
            Method::PUT,
            "/imageapi/token/AAAAAAAAAA/update-image/abcd/",
            &[Part::Text {
                name: "note",
                value: "no file",
            }],
        ))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), "invalid_token");
}

#[tokio::test]
async fn test_tokens_cannot_reach_other_namespaces() {
    let vault = TestVault::new().await;
    let alice = vault.register("alice").await;
    let bob = vault.register("bob").await;
    let png = create_test_png(8, 8);

    let id = vault.upload_ok(&alice, "cat.png", &png).await;

    assert_eq!(vault.fetch(&bob, &id).await.status, StatusCode::NOT_FOUND);
    assert_eq!(vault.delete(&bob, &id).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        vault.update(&bob, &id, "cat.png", &png).await.status,
        StatusCode::NOT_FOUND
    );

    // Same filename is independent in Bob's namespace.
    vault.upload_ok(&bob, "cat.png", &png).await;
    assert_eq!(vault.fetch(&alice, &id).await.status, StatusCode::OK);
}

// =============================================================================
// Get and List
// =============================================================================

#[tokio::test]
async fn test_get_unknown_image() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    vault.upload_ok(&token, "cat.png", &create_test_png(8, 8)).await;

    for image_id in ["zzzz", "toolong", "..", "a%2Fb"] {
        let response = vault.fetch(&token, image_id).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "id {:?}", image_id);
        assert_eq!(response.error_code(), "not_found");
    }
}

#[tokio::test]
async fn test_list_empty_namespace() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let response = vault.list(&token).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.error_code(), "not_found");
}

#[tokio::test]
async fn test_list_maps_filenames_to_ids() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let png_id = vault.upload_ok(&token, "cat.png", &create_test_png(8, 8)).await;
    let jpg_id = vault.upload_ok(&token, "dog.jpg", &create_test_jpeg(8, 8)).await;

    let response = vault.list(&token).await;
    assert_eq!(response.status, StatusCode::OK);

    let images = response.json()["images"].clone();
    assert_eq!(images.as_object().unwrap().len(), 2);
    assert_eq!(images["cat.png"], png_id.as_str());
    assert_eq!(images["dog.jpg"], jpg_id.as_str());
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn test_update_renames_and_replaces() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_test_png(8, 8);
    let jpeg = create_test_jpeg(16, 16);

    let id = vault.upload_ok(&token, "cat.png", &png).await;

    let response = vault.update(&token, &id, "dog.jpg", &jpeg).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "updated");
    assert_eq!(body["File ID"], id.as_str());

    let fetched = vault.fetch(&token, &id).await;
    assert_eq!(fetched.header("content-type"), "image/jpeg");
    assert_eq!(
        fetched.header("content-disposition"),
        "inline; filename=\"dog.jpg\""
    );
    assert_eq!(fetched.body.as_ref(), jpeg.as_slice());

    assert_eq!(vault.blob_names(&token), vec!["dog.jpg.gz".to_string()]);
    let listing = vault.list(&token).await.json();
    assert_eq!(listing["images"]["dog.jpg"], id.as_str());
    assert!(listing["images"].get("cat.png").is_none());
}

#[tokio::test]
async fn test_update_same_filename_replaces_content() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let id = vault.upload_ok(&token, "pic", &create_test_png(8, 8)).await;
    let gif = create_test_gif(12, 12);

    let response = vault.update(&token, &id, "pic", &gif).await;
    assert_eq!(response.status, StatusCode::OK);

    let fetched = vault.fetch(&token, &id).await;
    assert_eq!(fetched.header("content-type"), "image/gif");
    assert_eq!(fetched.body.as_ref(), gif.as_slice());
    assert_eq!(vault.blob_names(&token), vec!["pic.gz".to_string()]);
}

#[tokio::test]
async fn test_update_conflict_leaves_old_image_intact() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let cat = create_test_png(8, 8);
    let dog = create_test_png(9, 9);

    let cat_id = vault.upload_ok(&token, "cat.png", &cat).await;
    let dog_id = vault.upload_ok(&token, "dog.png", &dog).await;

    let response = vault
        .update(&token, &cat_id, "dog.png", &create_test_gif(4, 4))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.error_code(), "conflict");

    let fetched = vault.fetch(&token, &cat_id).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body.as_ref(), cat.as_slice());
    assert_eq!(vault.fetch(&token, &dog_id).await.body.as_ref(), dog.as_slice());
    assert_eq!(
        vault.blob_names(&token),
        vec!["cat.png.gz".to_string(), "dog.png.gz".to_string()]
    );
}

#[tokio::test]
async fn test_update_rejects_bad_content() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let png = create_test_png(8, 8);

    let id = vault.upload_ok(&token, "cat.png", &png).await;

    let response = vault.update(&token, &id, "cat.txt", b"plain text").await;
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);

    assert_eq!(vault.fetch(&token, &id).await.body.as_ref(), png.as_slice());
    assert_eq!(vault.blob_names(&token), vec!["cat.png.gz".to_string()]);
}

#[tokio::test]
async fn test_update_unknown_image() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let response = vault
        .update(&token, "zzzz", "cat.png", &create_test_png(8, 8))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(vault.blob_names(&token).is_empty());
}

#[tokio::test]
async fn test_update_without_file() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let id = vault.upload_ok(&token, "cat.png", &create_test_png(8, 8)).await;

    let response = vault
        .send(multipart_request(
            Method::PUT,
            &format!("/imageapi/token/{}/update-image/{}/", token, id),
            &[Part::Text {
                name: "note",
                value: "no file",
            }],
        ))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), "invalid_request");
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn test_delete_image() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let keep = vault.upload_ok(&token, "keep.png", &create_test_png(8, 8)).await;
    let gone = vault.upload_ok(&token, "gone.png", &create_test_png(8, 8)).await;

    let response = vault.delete(&token, &gone).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "deleted");
    assert_eq!(body["File ID"], gone.as_str());

    assert_eq!(vault.fetch(&token, &gone).await.status, StatusCode::NOT_FOUND);
    assert_eq!(vault.delete(&token, &gone).await.status, StatusCode::NOT_FOUND);
    assert_eq!(vault.fetch(&token, &keep).await.status, StatusCode::OK);
    assert_eq!(vault.blob_names(&token), vec!["keep.png.gz".to_string()]);

    // The filename is free again.
    vault.upload_ok(&token, "gone.png", &create_test_png(8, 8)).await;
}

#[tokio::test]
async fn test_delete_last_image_empties_listing() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;
    let id = vault.upload_ok(&token, "cat.png", &create_test_png(8, 8)).await;

    assert_eq!(vault.delete(&token, &id).await.status, StatusCode::OK);
    assert_eq!(vault.list(&token).await.status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Misc
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let vault = TestVault::new().await;

    let response = vault.get("/health").await;
    assert_eq!(response.status, StatusCode::OK);

    let health = response.json();
    assert_eq!(health["status"], "healthy");
    assert!(health["version"].is_string());
}

#[tokio::test]
async fn test_wrong_method_is_rejected() {
    let vault = TestVault::new().await;
    let token = vault.register("alice").await;

    let response = vault
        .send(empty_request(
            Method::GET,
            &format!("/imageapi/token/{}/upload-image/", token),
        ))
        .await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_cors_restricted_origins() {
    let vault = TestVault::with_config(
        RouterConfig::new()
            .with_tracing(false)
            .with_cors_origins(vec!["https://example.com".to_string()]),
    )
    .await;

    let allowed = vault
        .send(
            axum::http::Request::builder()
                .method(Method::GET)
                .uri("/health")
                .header("origin", "https://example.com")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(allowed.status, StatusCode::OK);
    assert_eq!(
        allowed.header("access-control-allow-origin"),
        "https://example.com"
    );

    let denied = vault
        .send(
            axum::http::Request::builder()
                .method(Method::GET)
                .uri("/health")
                .header("origin", "https://evil.example")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert!(denied.headers.get("access-control-allow-origin").is_none());
}
