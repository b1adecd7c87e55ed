use reqwest::StatusCode;
use serial_test::serial;
use tar::EntryType;

use super::common::{ECHO_CONTROL, ECHO_TOOL, FAILING_TOOL, TestServer, build_request};

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn build_requires_post() {
  let server = TestServer::start(ECHO_TOOL).await;

  let response = server.get("/api/v1/build").await;

  assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
  assert_eq!(response.text().await.unwrap(), "build endpoint only supports POST\n");
  assert!(!server.build_dir().exists());
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn build_requires_tar_content_type() {
  let server = TestServer::start(ECHO_TOOL).await;

  let response = reqwest::Client::new()
    .post(format!("{}/api/v1/build", server.url))
    .header("Content-Type", "application/json")
    .body("{}")
    .send()
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
  assert_eq!(
    response.text().await.unwrap(),
    "Content-Type must be [application/x-tar], got application/json\n"
  );
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn unknown_path_is_404() {
  let server = TestServer::start(ECHO_TOOL).await;

  assert_eq!(server.get("/api/v2/build").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn build_streams_transcript_and_leaves_artifacts() {
  let server = TestServer::start(ECHO_TOOL).await;
  let body = build_request(
    ECHO_CONTROL,
    &[
      ("store/", EntryType::Directory, b""),
      ("store/sha256:0123", EntryType::Regular, b"source blob"),
    ],
  );

  let response = server.post_build(body).await;
  assert_eq!(response.status(), StatusCode::CREATED);
  let transcript = response.text().await.unwrap();

  let build_dir = server.build_dir();
  let expected = format!(
    "starting {dir} build\nfake-tool --export tree --output-dir {dir}/output --store {dir}/store {dir}/manifest.json\n---\n{{\"fake\": \"manifest\"}}",
    dir = build_dir.display()
  );
  assert_eq!(transcript, expected);
  assert_eq!(std::fs::read_to_string(build_dir.join("build.log")).unwrap(), expected);
  assert_eq!(
    std::fs::read(build_dir.join("store/sha256:0123")).unwrap(),
    b"source blob"
  );

  let artifact = build_dir.join("output/output.tar");
  let mut archive = tar::Archive::new(std::fs::File::open(&artifact).unwrap());
  let names: Vec<String> = archive
    .entries()
    .unwrap()
    .map(|entry| entry.unwrap().path().unwrap().display().to_string())
    .collect();
  assert!(names.iter().any(|name| name.ends_with("disk.img")), "{names:?}");
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn second_build_is_refused() {
  let server = TestServer::start(ECHO_TOOL).await;

  let first = server.post_build(build_request(ECHO_CONTROL, &[])).await;
  assert_eq!(first.status(), StatusCode::CREATED);
  let transcript = first.text().await.unwrap();
  assert!(!transcript.contains("error: "), "{transcript}");

  let second = server.post_build(build_request("{}", &[])).await;
  assert_eq!(second.status(), StatusCode::CONFLICT);
  assert_eq!(second.text().await.unwrap(), "build already started\n");
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn concurrent_builds_have_one_winner() {
  let server = TestServer::start("#!/bin/sh\nsleep 1\necho done\n").await;

  let (a, b) = tokio::join!(
    server.post_build(build_request("{}", &[])),
    server.post_build(build_request("{}", &[]))
  );

  let mut statuses = vec![a.status(), b.status()];
  statuses.sort();
  assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn echo_tool_fails_without_control_environment() {
  let server = TestServer::start(ECHO_TOOL).await;

  let response = server.post_build(build_request(r#"{"exports": ["tree"]}"#, &[])).await;

  assert_eq!(response.status(), StatusCode::CREATED);
  let transcript = response.text().await.unwrap();
  assert!(
    transcript.ends_with(&format!("error: {} failed: exit status: 1\n", server.tool.display())),
    "{transcript}"
  );
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn invalid_source_name_is_rejected_and_spends_the_slot() {
  let server = TestServer::start(ECHO_TOOL).await;
  let body = build_request("{}", &[("store/../../etc/passwd", EntryType::Regular, b"x")]);

  let response = server.post_build(body).await;

  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  assert_eq!(
    response.text().await.unwrap(),
    "name not clean: ../etc/passwd != store/../../etc/passwd\n"
  );

  let retry = server.post_build(build_request("{}", &[])).await;
  assert_eq!(retry.status(), StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn malformed_control_keeps_the_slot_free() {
  let server = TestServer::start(ECHO_TOOL).await;

  let rejected = server.post_build(build_request("{not json", &[])).await;
  assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
  assert!(rejected.text().await.unwrap().starts_with("cannot decode control.json: "));
  assert!(!server.build_dir().exists());

  let accepted = server.post_build(build_request(ECHO_CONTROL, &[])).await;
  assert_eq!(accepted.status(), StatusCode::CREATED);
  let transcript = accepted.text().await.unwrap();
  assert!(!transcript.contains("error: "), "{transcript}");
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn failing_tool_reports_error_on_the_stream() {
  let server = TestServer::start(FAILING_TOOL).await;

  let response = server.post_build(build_request("{}", &[])).await;

  assert_eq!(response.status(), StatusCode::CREATED);
  let transcript = response.text().await.unwrap();
  let expected_tail = format!(
    "about to fail\nerror: {} failed: exit status: 1\n",
    server.tool.display()
  );
  assert!(transcript.ends_with(&expected_tail), "{transcript}");
  assert!(!server.build_dir().join("output/output.tar").exists());
}
