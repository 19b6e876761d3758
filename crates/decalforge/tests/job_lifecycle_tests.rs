//! End-to-end job lifecycle: submission, background pipeline, terminal
//! states and the archive on disk.

mod common;

use std::fs::File;
use std::io::Read;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use decalforge::error::{DecalError, PersistenceError, ValidationError};
use decalforge::job::{GenerationRequest, JobPatch, JobPhase, JobStatus};
use decalforge::provider::OpenAiProvider;
use decalforge::store::JobRepository;
use secrecy::SecretString;

use common::{FailingProvider, Route, StaticProvider, TestHarness, TestServer, PNG_BYTES};

fn zip_entries(path: &std::path::Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_neon_dragon_completes_with_download_url() {
    let server = TestServer::start().await;
    server.route("/img/dragon.png", Route::png(PNG_BYTES));
    server.route(
        "/v1/images/generations",
        Route::json(&format!(
            r#"{{"data":[{{"url":"{}"}}]}}"#,
            server.url("/img/dragon.png")
        )),
    );

    let h = TestHarness::new();
    let provider = OpenAiProvider::new(
        Some(SecretString::from("sk-test".to_string())),
        server.url("/v1/images/generations"),
        "dall-e-3",
    )
    .unwrap();
    let orch = h.orchestrator(Arc::new(provider));

    let submitted = orch
        .submit(GenerationRequest::new("neon dragon", &["#00FF00", "#0000FF"]))
        .await
        .unwrap();
    assert_eq!(submitted.status, JobStatus::Processing);

    let job = orch.wait(&submitted.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.phase, JobPhase::Completed);
    assert_eq!(job.provider.as_deref(), Some("openai"));
    assert_eq!(job.colors, vec!["#00FF00", "#0000FF"]);
    assert!(job.completed_at.is_some());

    let status = orch.get_status(&submitted.job_id).await.unwrap();
    let url = status.download_url.expect("completed job has a download url");
    assert!(!url.is_empty());
    assert_eq!(orch.download(&submitted.job_id).await.unwrap(), url);

    let archive = h.archive_path(&submitted.job_id);
    assert_eq!(url, archive.display().to_string());

    let id = &submitted.job_id;
    assert_eq!(
        zip_entries(&archive),
        vec![format!("{id}_config.json"), format!("{id}_diffuse.png")]
    );
    assert_eq!(server.hits("/img/dragon.png"), 1);
}

#[tokio::test]
async fn test_archive_descriptor_is_keyed_by_prompt() {
    let server = TestServer::start().await;
    server.route("/wolf.png", Route::png(PNG_BYTES));

    let h = TestHarness::new();
    let orch = h.orchestrator(Arc::new(StaticProvider::new(server.url("/wolf.png"))));

    let submitted = orch
        .submit(GenerationRequest::new("flaming wolf", &["#FF4500"]))
        .await
        .unwrap();
    orch.wait(&submitted.job_id).await.unwrap();

    let id = &submitted.job_id;
    let mut archive =
        zip::ZipArchive::new(File::open(h.archive_path(id)).unwrap()).unwrap();
    let mut json = String::new();
    archive
        .by_name(&format!("{id}_config.json"))
        .unwrap()
        .read_to_string(&mut json)
        .unwrap();

    let descriptor: serde_json::Value = serde_json::from_str(&json).unwrap();
    let entry = &descriptor["flaming wolf"];
    assert_eq!(entry["BodyID"], 23);
    assert_eq!(entry["SkinID"], decalforge::skin_id(id));
    assert_eq!(entry["Chassis"]["Diffuse"], format!("{id}_diffuse.png"));
    assert_eq!(entry["Body"]["1_Diffuse_Skin"], format!("{id}_diffuse.png"));
    assert_eq!(entry["Body"]["Diffuse"], "body.png");
    assert_eq!(entry["Body"]["Normal"], "");
}

#[tokio::test]
async fn test_failing_provider_never_reaches_later_stages() {
    let h = TestHarness::new();
    let orch = h.orchestrator(Arc::new(FailingProvider));

    let submitted = orch
        .submit(GenerationRequest::new("flaming wolf", &["#FF0000"]))
        .await
        .unwrap();
    let job = orch.wait(&submitted.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_stage.as_deref(), Some("provider"));
    assert!(job.download_url.is_none());
    assert!(!h.archive_path(&submitted.job_id).exists());
    assert_eq!(h.emitter_calls(), 0);
    assert_eq!(h.packager_calls(), 0);

    assert!(matches!(
        orch.download(&submitted.job_id).await,
        Err(DecalError::NotReady {
            status: JobStatus::Failed,
            ..
        })
    ));
}

#[tokio::test]
async fn test_fetch_failure_skips_emitter_and_packager() {
    let server = TestServer::start().await;
    let provider = Arc::new(StaticProvider::new(server.url("/missing.png")));

    let h = TestHarness::new();
    let orch = h.orchestrator(provider.clone());

    let submitted = orch
        .submit(GenerationRequest::new("flaming wolf", &["#FF0000"]))
        .await
        .unwrap();
    let job = orch.wait(&submitted.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_stage.as_deref(), Some("fetch"));
    assert_eq!(job.image_url.as_deref(), Some(provider.url.as_str()));
    assert_eq!(server.hits("/missing.png"), 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.emitter_calls(), 0);
    assert_eq!(h.packager_calls(), 0);
}

#[tokio::test]
async fn test_empty_palette_is_rejected_without_a_record() {
    let h = TestHarness::new();
    let orch = h.orchestrator(Arc::new(FailingProvider));

    let err = orch
        .submit(GenerationRequest::new("neon dragon", &[]))
        .await
        .unwrap_err();

    assert!(matches!(err, DecalError::Validation(ValidationError::NoColors)));
    assert!(orch.list_jobs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_identical_concurrent_submissions_are_independent() {
    let server = TestServer::start().await;
    server.route("/same.png", Route::png(PNG_BYTES));

    let h = TestHarness::new();
    let provider = Arc::new(StaticProvider::new(server.url("/same.png")));
    let orch = h.orchestrator(provider.clone());
    let request = GenerationRequest::new("neon dragon", &["#00FF00"]);

    let (a, b) = tokio::join!(orch.submit(request.clone()), orch.submit(request));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.job_id, b.job_id);

    let ja = orch.wait(&a.job_id).await.unwrap();
    let jb = orch.wait(&b.job_id).await.unwrap();
    assert_eq!(ja.status, JobStatus::Completed);
    assert_eq!(jb.status, JobStatus::Completed);
    assert_ne!(ja.download_url, jb.download_url);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    assert_eq!(server.hits("/same.png"), 2);
}

#[tokio::test]
async fn test_terminal_state_is_final() {
    let server = TestServer::start().await;
    server.route("/final.png", Route::png(PNG_BYTES));

    let h = TestHarness::new();
    let orch = h.orchestrator(Arc::new(StaticProvider::new(server.url("/final.png"))));
    let submitted = orch
        .submit(GenerationRequest::new("chrome skull", &["#C0C0C0"]))
        .await
        .unwrap();
    orch.wait(&submitted.job_id).await.unwrap();

    let err = h
        .store
        .update(&submitted.job_id, &JobPatch::failed("late"))
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Terminal { .. }));

    let job = orch.get_job(&submitted.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.failed_stage.is_none());
}

#[tokio::test]
async fn test_resume_incomplete_after_restart() {
    let h = TestHarness::new();
    let orch = h
        .orchestrator(Arc::new(FailingProvider))
        .with_lease(Duration::ZERO);

    let leftover = h
        .store
        .create(
            GenerationRequest::new("half done", &["#123456"])
                .validate()
                .unwrap(),
        )
        .unwrap();
    h.store.update(&leftover.id, &JobPatch::processing()).unwrap();

    assert_eq!(orch.resume_incomplete().await.unwrap(), 1);
    let job = orch.get_job(&leftover.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_stage.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn test_second_process_leaves_a_live_job_running() {
    let server = TestServer::start().await;
    server.route("/live.png", Route::png(PNG_BYTES));

    let h = TestHarness::new();
    let provider = Arc::new(StaticProvider::with_delay(
        server.url("/live.png"),
        Duration::from_millis(500),
    ));
    let owner = h.orchestrator_with(provider.clone(), h.shared_store("shared.db"));
    let other = h.orchestrator_with(provider, h.shared_store("shared.db"));

    let submitted = owner
        .submit(GenerationRequest::new("neon dragon", &["#00FF00"]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(other.resume_incomplete().await.unwrap(), 0);
    assert_eq!(
        other.get_job(&submitted.job_id).await.unwrap().status,
        JobStatus::Processing
    );

    let job = owner.wait(&submitted.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(
        other.get_job(&submitted.job_id).await.unwrap().status,
        JobStatus::Completed
    );
}

#[tokio::test]
async fn test_heartbeat_outlives_the_lease() {
    let server = TestServer::start().await;
    server.route("/slow.png", Route::png(PNG_BYTES));

    let h = TestHarness::new();
    let lease = Duration::from_millis(200);
    let provider = Arc::new(StaticProvider::with_delay(
        server.url("/slow.png"),
        Duration::from_millis(600),
    ));
    let owner = h
        .orchestrator_with(provider.clone(), h.shared_store("shared.db"))
        .with_lease(lease);
    let other = h
        .orchestrator_with(provider, h.shared_store("shared.db"))
        .with_lease(lease);

    let submitted = owner
        .submit(GenerationRequest::new("flaming wolf", &["#FF4500"]))
        .await
        .unwrap();

    // well past the lease, with the provider still working
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(other.resume_incomplete().await.unwrap(), 0);

    let job = owner.wait(&submitted.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.failed_stage.is_none());
}

#[tokio::test]
async fn test_second_process_fails_an_abandoned_job() {
    let h = TestHarness::new();
    let abandoned = h.shared_store("shared.db");
    let leftover = abandoned
        .create(
            GenerationRequest::new("half done", &["#123456"])
                .validate()
                .unwrap(),
        )
        .unwrap();
    drop(abandoned);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let other = h
        .orchestrator_with(Arc::new(FailingProvider), h.shared_store("shared.db"))
        .with_lease(Duration::from_millis(50));

    assert_eq!(other.resume_incomplete().await.unwrap(), 1);
    let job = other.get_job(&leftover.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failed_stage.as_deref(), Some("interrupted"));
}
