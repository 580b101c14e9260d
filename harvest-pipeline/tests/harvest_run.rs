use harvest_core::{CancelSignal, CoreError, HarvestConfig, RunStatus};
use harvest_pipeline::{export_dataset, HarvestEvent, Harvester, RunPhase};
use serde_json::{json, Value};
use std::collections::HashSet;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> HarvestConfig {
    let mut config = HarvestConfig::default();
    config.credentials.client_id = Some("id".to_string());
    config.credentials.client_secret = Some("secret".to_string());
    config.credentials.username = Some("user".to_string());
    config.credentials.password = Some("pass".to_string());
    config.http.api_base_url = server.uri();
    config.http.auth_base_url = server.uri();
    config.http.max_retries = 0;
    config.search.query = "borrow checker".to_string();
    config.search.inter_page_delay_ms = 0;
    config.search.inter_page_jitter_ms = 0;
    config.schedule.batch_size = 2;
    config.schedule.inter_batch_delay_ms = 0;
    config.schedule.inter_batch_jitter_ms = 0;
    config
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

fn listing(children: Vec<Value>) -> Value {
    json!({"kind": "Listing", "data": {"children": children, "after": null, "before": null}})
}

fn post(id: &str) -> Value {
    json!({
        "kind": "t3",
        "data": {
            "id": id,
            "title": format!("Fighting the borrow checker, part {}", id),
            "selftext": "",
            "author": "rustacean",
            "subreddit": "rust",
            "permalink": format!("/r/rust/comments/{}/thread/", id),
            "created_utc": 1700000000.0,
            "score": 3,
            "num_comments": 4
        }
    })
}

fn comment(id: &str, score: i64, replies: Value) -> Value {
    json!({
        "kind": "t1",
        "data": {
            "id": id,
            "author": "commenter",
            "body": format!("comment {} with enough text", id),
            "score": score,
            "created_utc": 1700000100.0,
            "replies": replies
        }
    })
}

/// `top` top-level comments, each with one reply.
fn comment_page(post_id: &str, top: usize) -> Value {
    let comments = (0..top)
        .map(|i| {
            comment(
                &format!("{}_{}", post_id, i),
                2,
                listing(vec![comment(&format!("{}_{}_r", post_id, i), 4, json!(""))]),
            )
        })
        .collect();
    json!([listing(vec![post(post_id)]), listing(comments)])
}

async fn mount_search(server: &MockServer, ids: &[&str]) {
    let children = ids.iter().map(|id| post(id)).collect();
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "borrow checker"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(children)))
        .mount(server)
        .await;
}

async fn mount_comments(server: &MockServer, post_id: &str, top: usize) {
    Mock::given(method("GET"))
        .and(path(format!("/r/rust/comments/{}/thread", post_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(comment_page(post_id, top)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_run_assembles_dataset() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_search(&server, &["a", "b", "c"]).await;
    mount_comments(&server, "a", 2).await;
    mount_comments(&server, "b", 1).await;
    Mock::given(method("GET"))
        .and(path("/r/rust/comments/c/thread"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut harvester = Harvester::new(config(&server)).unwrap();
    let mut events = harvester.subscribe();
    let report = harvester.run(&CancelSignal::new()).await.unwrap();

    let dataset = &report.dataset;
    assert_eq!(report.status(), RunStatus::Completed);
    assert_eq!(harvester.phase(), RunPhase::Completed);
    assert_eq!(dataset.metadata().total_posts, 3);
    assert_eq!(dataset.metadata().total_comments, 6);
    assert!(!dataset.is_partial());
    assert_eq!(dataset.metadata().query, "borrow checker");
    assert!((dataset.metadata().average_score - 3.0).abs() < f64::EPSILON);

    let summary = &dataset.posts()[0].comment_summary;
    assert_eq!(summary.total_comments, 4);
    assert_eq!(summary.top_level_comments, 2);
    assert_eq!(summary.reply_comments, 2);
    assert_eq!(summary.max_depth, 1);
    assert_eq!(dataset.posts()[2].comment_summary.total_comments, 0);

    let depths: Vec<_> = dataset.comments().iter().map(|c| c.depth).collect();
    assert_eq!(depths, vec![0, 1, 0, 1, 0, 1]);
    assert_eq!(dataset.comments()[0].post_id, "a");

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert_eq!(
        received,
        vec![
            HarvestEvent::PhaseChanged {
                phase: RunPhase::SearchingPosts
            },
            HarvestEvent::PostsDiscovered { posts: 3, pages: 1 },
            HarvestEvent::PhaseChanged {
                phase: RunPhase::FetchingComments
            },
            HarvestEvent::BatchCompleted {
                completed: 2,
                total: 3
            },
            HarvestEvent::BatchCompleted {
                completed: 3,
                total: 3
            },
            HarvestEvent::PhaseChanged {
                phase: RunPhase::Assembling
            },
            HarvestEvent::PhaseChanged {
                phase: RunPhase::Completed
            },
        ]
    );
}

#[tokio::test]
async fn test_budget_and_cap_bound_the_dataset() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_search(&server, &["a", "b", "c", "d"]).await;
    for id in ["a", "b", "c", "d"] {
        mount_comments(&server, id, 5).await;
    }

    let mut config = config(&server);
    config.comments.comments_per_post_cap = 6;
    config.comments.target_comment_budget = 15;
    let mut harvester = Harvester::new(config).unwrap();
    let mut events = harvester.subscribe();
    let report = harvester.run(&CancelSignal::new()).await.unwrap();

    let per_post: Vec<_> = report
        .dataset
        .posts()
        .iter()
        .map(|p| p.comment_summary.total_comments)
        .collect();
    assert_eq!(per_post, vec![6, 6, 3]);
    assert_eq!(report.dataset.metadata().total_comments, 15);
    assert!(report.budget_exhausted);

    let ids: HashSet<_> = report.dataset.posts().iter().map(|p| &p.post.id).collect();
    assert_eq!(ids.len(), report.dataset.posts().len());

    let mut saw_budget_event = false;
    while let Ok(event) = events.try_recv() {
        if event == (HarvestEvent::BudgetExhausted { target: 15 }) {
            saw_budget_event = true;
        }
    }
    assert!(saw_budget_event);
}

#[tokio::test]
async fn test_cancelled_run_is_partial() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_search(&server, &["a"]).await;

    let harvester = Harvester::new(config(&server)).unwrap();
    let cancel = CancelSignal::new();
    cancel.cancel();

    let report = harvester.run(&cancel).await.unwrap();
    assert_eq!(report.status(), RunStatus::Cancelled);
    assert!(report.dataset.is_partial());
    assert!(report.dataset.posts().is_empty());
    assert_eq!(harvester.phase(), RunPhase::Cancelled);
}

#[tokio::test]
async fn test_auth_failure_fails_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let harvester = Harvester::new(config(&server)).unwrap();
    let result = harvester.run(&CancelSignal::new()).await;

    assert!(matches!(result, Err(CoreError::Auth(_))));
    assert_eq!(harvester.phase(), RunPhase::Failed);
}

#[tokio::test]
async fn test_token_is_reused_across_runs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_search(&server, &["a"]).await;
    mount_comments(&server, "a", 1).await;

    let harvester = Harvester::new(config(&server)).unwrap();
    harvester.run(&CancelSignal::new()).await.unwrap();
    let second = harvester.run(&CancelSignal::new()).await.unwrap();

    assert_eq!(second.token_refreshes, 1);
    server.verify().await;
}

#[tokio::test]
async fn test_report_exports_to_disk() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_search(&server, &["a"]).await;
    mount_comments(&server, "a", 1).await;

    let harvester = Harvester::new(config(&server)).unwrap();
    let report = harvester.run(&CancelSignal::new()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dataset.json");
    export_dataset(&report.dataset, &path).unwrap();

    let value: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["metadata"]["totalComments"], 2);
    assert_eq!(value["comments"][1]["depth"], 1);
    assert_eq!(value["posts"][0]["commentSummary"]["replyComments"], 1);
}
