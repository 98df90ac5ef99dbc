mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::{create_project, make_admin, send, signup, test_app};

#[tokio::test]
async fn current_user_reflects_the_token() -> Result<()> {
    let app = test_app();
    let (_, alice) = signup(&app, "alice").await?;
    let (_, bob) = signup(&app, "bob").await?;

    let (status, body) = send(&app, "GET", "/api/user", Some(&alice), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");
    assert!(body.get("password").is_none());

    let (_, body) = send(&app, "GET", "/api/user", Some(&bob), None).await?;
    assert_eq!(body["username"], "bob");
    Ok(())
}

#[tokio::test]
async fn self_service_upgrade_changes_plan() -> Result<()> {
    let app = test_app();
    let (_, token) = signup(&app, "alice").await?;

    let (status, body) = send(
        &app,
        "POST",
        "/api/update-subscription",
        Some(&token),
        Some(json!({ "plan": "pro" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "pro");

    // The change is visible on the next request.
    let (_, me) = send(&app, "GET", "/api/user", Some(&token), None).await?;
    assert_eq!(me["plan"], "pro");
    Ok(())
}

#[tokio::test]
async fn unknown_plan_name_is_rejected() -> Result<()> {
    let app = test_app();
    let (_, token) = signup(&app, "alice").await?;

    for body in [json!({ "plan": "platinum" }), json!({})] {
        let (status, response) = send(
            &app,
            "POST",
            "/api/update-subscription",
            Some(&token),
            Some(body),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["message"], "Invalid subscription plan");
    }
    Ok(())
}

#[tokio::test]
async fn user_listing_is_admin_only() -> Result<()> {
    let app = test_app();
    let (alice_id, alice) = signup(&app, "alice").await?;
    let (_, bob) = signup(&app, "bob").await?;

    let (status, body) = send(&app, "GET", "/api/users", Some(&bob), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Forbidden");

    make_admin(&app, alice_id).await?;
    let (status, body) = send(&app, "GET", "/api/users", Some(&alice), None).await?;
    assert_eq!(status, StatusCode::OK);
    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("password").is_none()));
    Ok(())
}

#[tokio::test]
async fn admin_fetches_a_single_user() -> Result<()> {
    let app = test_app();
    let (alice_id, alice) = signup(&app, "alice").await?;
    let (bob_id, _) = signup(&app, "bob").await?;
    make_admin(&app, alice_id).await?;

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/users/{}", bob_id),
        Some(&alice),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "bob");

    let (status, body) = send(&app, "GET", "/api/users/9999", Some(&alice), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "User not found");
    Ok(())
}

#[tokio::test]
async fn admin_plan_change_takes_effect_next_request() -> Result<()> {
    let app = test_app();
    let (admin_id, admin) = signup(&app, "admin").await?;
    make_admin(&app, admin_id).await?;
    let (bob_id, bob) = signup(&app, "bob").await?;

    // Bob fills the free tier.
    for i in 0..3 {
        create_project(&app, &bob, &format!("p{}", i)).await?;
    }
    let (status, _) = send(
        &app,
        "POST",
        "/api/projects",
        Some(&bob),
        Some(json!({ "name": "one too many" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/users/{}/plan", bob_id),
        Some(&admin),
        Some(json!({ "plan": "pro" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plan"], "pro");

    // No re-login needed; the next request reads the new plan.
    let (status, _) = send(
        &app,
        "POST",
        "/api/projects",
        Some(&bob),
        Some(json!({ "name": "fourth" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn plan_change_endpoints_reject_non_admins() -> Result<()> {
    let app = test_app();
    let (alice_id, _) = signup(&app, "alice").await?;
    let (_, bob) = signup(&app, "bob").await?;

    let (status, body) = send(
        &app,
        "PATCH",
        &format!("/api/users/{}/plan", alice_id),
        Some(&bob),
        Some(json!({ "plan": "enterprise" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Forbidden");
    Ok(())
}
