//! Unit tests for the dockerised lifecycle, readiness strategies and builder
//! validation.


use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use reqwest::StatusCode;
use rstest::{fixture, rstest};
use serde_json::json;

use self::fake_runtime::{Call, FakeRuntime};
use super::*;
use crate::detector::{LogDetector, ProbeError, ProbeFuture, ProbeResponse};
use crate::engine::MANAGED_LABEL;
use crate::error::ConfigError;

mock! {
    Prober {}

    impl HttpProber for Prober {
        fn head(&self, url: &str) -> ProbeFuture<'_>;
    }
}

#[fixture]
fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Runtime::new().expect("runtime should build")
}

fn couchdb() -> DockerisedControllerBuilder {
    DockerisedControllerBuilder::new("library/couchdb", "latest").ports([5984, 4369])
}

fn ready_on(needle: &str) -> LogDetector {
    LogDetector::contains(needle)
}

fn build(
    builder: DockerisedControllerBuilder,
    fake: &Arc<FakeRuntime>,
) -> DockerisedController {
    let runtime: Arc<dyn ContainerRuntime> = Arc::clone(fake) as Arc<dyn ContainerRuntime>;
    builder.build(runtime).expect("controller should build")
}

fn build_error(builder: DockerisedControllerBuilder) -> ConfigError {
    let fake = Arc::new(FakeRuntime::default());
    match builder.build(fake) {
        Err(FixtainerError::Config(error)) => error,
        Err(other) => panic!("expected configuration error, got {other:?}"),
        Ok(_) => panic!("expected configuration error, got a controller"),
    }
}

fn is_create(call: &Call) -> bool {
    matches!(call, Call::Create(_))
}

fn is_pull(call: &Call) -> bool {
    matches!(call, Call::Pull(_))
}

fn is_remove(call: &Call) -> bool {
    matches!(call, Call::Remove(_))
}

#[rstest]
fn start_line_after_boot_output_starts_in_one_attempt(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["booting", "ready"]]));
    let controller = build(couchdb().start_log_detector(ready_on("ready")).start_tries(3), &fake);

    let service = controller
        .start_service(runtime.handle())
        .expect("service should start");

    assert_eq!(fake.count(is_create), 1);
    assert!(service.is_started());
    assert_eq!(
        service.ports().keys().copied().collect::<Vec<_>>(),
        vec![4369, 5984]
    );
    assert!(service.ports().values().all(|host_port| *host_port != 0));
    assert!(service.name().starts_with("couchdb-"));
    assert_eq!(service.controller(), Some("library/couchdb:latest"));
}

#[rstest]
fn created_container_is_named_labelled_and_published(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["ready"]]));
    let controller = build(couchdb().start_log_detector(ready_on("ready")), &fake);

    let service = controller
        .start_service(runtime.handle())
        .expect("service should start");

    assert_eq!(
        fake.calls().get(2),
        Some(&Call::Create(String::from(service.name())))
    );
    let body = fake.bodies().into_iter().next().expect("body should be captured");
    assert_eq!(body.image.as_deref(), Some("sha256:library/couchdb:latest"));
    assert_eq!(
        body.labels
            .as_ref()
            .and_then(|labels| labels.get(MANAGED_LABEL))
            .map(String::as_str),
        Some("true")
    );
    let bindings = body
        .host_config
        .and_then(|host_config| host_config.port_bindings)
        .expect("ports should be bound");
    let host_port = service.host_port(5984).map(|port| port.to_string());
    let bound = bindings
        .get("5984/tcp")
        .cloned()
        .flatten()
        .and_then(|entries| entries.into_iter().next())
        .and_then(|binding| binding.host_port);
    assert_eq!(bound, host_port);
}

#[rstest]
fn persistent_error_line_aborts_after_one_attempt(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["booting", "fatal: disk full"]]));
    let controller = build(
        couchdb()
            .start_log_detector(ready_on("ready"))
            .persistent_error_log_detector(ready_on("fatal"))
            .start_tries(3),
        &fake,
    );

    let result = controller.start_service(runtime.handle());

    assert!(
        matches!(
            result,
            Err(FixtainerError::Start(ServiceStartError::Persistent { ref reason }))
                if reason.contains("fatal: disk full")
        ),
        "expected persistent failure, got {result:?}"
    );
    assert_eq!(fake.count(is_create), 1);
    assert_eq!(fake.count(is_remove), 1, "failed attempt should be cleaned up");
}

#[rstest]
fn transient_error_on_every_attempt_exhausts_start_tries(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["connection reset", "ready"]]));
    let controller = build(
        couchdb()
            .start_log_detector(ready_on("ready"))
            .transient_error_log_detector(ready_on("connection reset"))
            .start_tries(3),
        &fake,
    );

    let result = controller.start_service(runtime.handle());

    assert!(
        matches!(
            result,
            Err(FixtainerError::Start(ServiceStartError::RetriesExhausted { attempts: 3 }))
        ),
        "expected retries exhausted, got {result:?}"
    );
    assert_eq!(fake.count(is_create), 3);
    assert_eq!(fake.count(is_remove), 3);
}

#[rstest]
fn persistent_detector_alone_aborts_after_one_attempt(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["booting", "fatal: disk full"]]));
    let controller = build(
        couchdb()
            .persistent_error_log_detector(ready_on("fatal"))
            .start_tries(3),
        &fake,
    );

    let result = controller.start_service(runtime.handle());

    assert!(
        matches!(
            result,
            Err(FixtainerError::Start(ServiceStartError::Persistent { ref reason }))
                if reason.contains("fatal: disk full")
        ),
        "expected persistent failure, got {result:?}"
    );
    assert_eq!(fake.count(is_create), 1);
    assert_eq!(fake.count(is_remove), 1);
}

#[rstest]
#[case::error_line(&["connection reset"])]
#[case::output_ends(&["booting"])]
fn transient_detector_alone_retries_until_exhausted(
    runtime: tokio::runtime::Runtime,
    #[case] output: &[&str],
) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[output]));
    let controller = build(
        couchdb()
            .transient_error_log_detector(ready_on("connection reset"))
            .start_tries(2),
        &fake,
    );

    let result = controller.start_service(runtime.handle());

    assert!(
        matches!(
            result,
            Err(FixtainerError::Start(ServiceStartError::RetriesExhausted { attempts: 2 }))
        ),
        "expected retries exhausted, got {result:?}"
    );
    assert_eq!(fake.count(is_create), 2);
    assert_eq!(fake.count(is_remove), 2);
}

#[rstest]
fn broken_log_stream_is_retried_with_the_output_so_far(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(
        FakeRuntime::with_outputs(&[&["booting"], &["booting", "ready"]]).break_log_streams(1),
    );
    let controller = build(
        couchdb().start_log_detector(ready_on("ready")).start_tries(2),
        &fake,
    );

    let service = controller
        .start_service(runtime.handle())
        .expect("second attempt should succeed");

    assert_eq!(fake.count(is_create), 2);
    assert_eq!(fake.count(is_remove), 1);
    assert_eq!(
        service.container().map(|handle| handle.id.as_str()),
        Some("container-2")
    );
}

#[rstest]
fn broken_log_stream_on_every_attempt_exhausts_start_tries(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["booting"]]).break_log_streams(2));
    let controller = build(
        couchdb().start_log_detector(ready_on("ready")).start_tries(2),
        &fake,
    );

    let result = controller.start_service(runtime.handle());

    assert!(
        matches!(
            result,
            Err(FixtainerError::Start(ServiceStartError::RetriesExhausted { attempts: 2 }))
        ),
        "expected retries exhausted, got {result:?}"
    );
}

#[rstest]
fn transient_error_then_start_succeeds_on_retry(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[
        &["connection reset"],
        &["booting", "ready"],
    ]));
    let controller = build(
        couchdb()
            .start_log_detector(ready_on("ready"))
            .transient_error_log_detector(ready_on("connection reset"))
            .start_tries(3),
        &fake,
    );

    let service = controller
        .start_service(runtime.handle())
        .expect("second attempt should succeed");

    assert_eq!(fake.count(is_create), 2);
    assert_eq!(fake.count(is_remove), 1);
    assert_eq!(
        service.container().map(|handle| handle.id.as_str()),
        Some("container-2")
    );
}

#[rstest]
fn exited_container_is_a_transient_failure_with_log_dump(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["booting", "shutting down"]]));
    let controller = build(couchdb().start_log_detector(ready_on("ready")), &fake);
    let mut service = DockerisedService::default();
    runtime
        .block_on(controller.lifecycle().start(&mut service))
        .expect("container should start");

    let result = runtime.block_on(controller.lifecycle().wait_until_started(&service));

    assert!(
        matches!(
            result,
            Err(FixtainerError::Start(ServiceStartError::Transient { ref reason }))
                if reason.contains("container has stopped") && reason.contains("shutting down")
        ),
        "expected transient failure with dump, got {result:?}"
    );
}

#[rstest]
fn service_aware_detector_receives_the_started_service(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["listening on 5984"]]));
    let detector = LogDetector::new(|line, service| {
        service.host_port(5984).is_some() && line.ends_with("5984")
    });
    let controller = build(couchdb().start_log_detector(detector), &fake);

    let result = controller.start_service(runtime.handle());

    assert!(result.is_ok(), "expected start, got {result:?}");
}

#[rstest]
fn http_detection_polls_until_the_classifier_accepts(runtime: tokio::runtime::Runtime) {
    let statuses = Arc::new(Mutex::new(VecDeque::from([
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::OK,
    ])));
    let probed_urls = Arc::new(Mutex::new(Vec::new()));
    let urls_for_mock = Arc::clone(&probed_urls);
    let mut prober = MockProber::new();
    prober.expect_head().times(3).returning(move |url| {
        urls_for_mock
            .lock()
            .expect("url lock should succeed")
            .push(String::from(url));
        let status = statuses
            .lock()
            .expect("status lock should succeed")
            .pop_front()
            .unwrap_or(StatusCode::OK);
        Box::pin(async move { Ok(ProbeResponse::new(status)) })
    });

    let fake = Arc::new(FakeRuntime::default());
    let controller = build(
        couchdb()
            .start_http_detector(HttpDetector::status(StatusCode::OK))
            .start_http_detection_endpoint("/_up")
            .http_prober(Arc::new(prober)),
        &fake,
    );

    let service = controller
        .start_service(runtime.handle())
        .expect("service should start");

    let host_port = service.host_port(5984).expect("5984 should be published");
    let urls = probed_urls.lock().expect("url lock should succeed").clone();
    assert_eq!(urls.len(), 3);
    assert!(
        urls.iter()
            .all(|url| *url == format!("http://localhost:{host_port}/_up"))
    );
}

#[rstest]
fn http_probe_errors_count_as_not_ready(runtime: tokio::runtime::Runtime) {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_for_mock = Arc::clone(&calls);
    let mut prober = MockProber::new();
    prober.expect_head().returning(move |_url| {
        let call = calls_for_mock.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if call == 0 {
                Err(ProbeError::from("connection refused"))
            } else {
                Ok(ProbeResponse::new(StatusCode::NO_CONTENT))
            }
        })
    });

    let fake = Arc::new(FakeRuntime::default());
    let controller = build(
        couchdb()
            .start_http_detector(HttpDetector::success())
            .start_http_detection_endpoint("_up")
            .http_prober(Arc::new(prober)),
        &fake,
    );

    controller
        .start_service(runtime.handle())
        .expect("service should start");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[rstest]
fn http_polling_is_bounded_by_the_start_timeout(runtime: tokio::runtime::Runtime) {
    let mut prober = MockProber::new();
    prober
        .expect_head()
        .returning(|_url| Box::pin(async { Ok(ProbeResponse::new(StatusCode::SERVICE_UNAVAILABLE)) }));

    let fake = Arc::new(FakeRuntime::default());
    let controller = build(
        couchdb()
            .start_http_detector(HttpDetector::status(StatusCode::OK))
            .start_http_detection_endpoint("_up")
            .http_prober(Arc::new(prober))
            .start_timeout(Duration::from_millis(250))
            .start_tries(2),
        &fake,
    );

    let result = controller.start_service(runtime.handle());

    assert!(
        matches!(
            result,
            Err(FixtainerError::Start(ServiceStartError::RetriesExhausted { attempts: 2 }))
        ),
        "expected retries exhausted, got {result:?}"
    );
    assert_eq!(fake.count(is_remove), 2);
}

#[rstest]
fn custom_monitor_decides_readiness(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::default());
    let monitor = StartupMonitor::new(|service| {
        let started = service.is_started();
        Box::pin(async move {
            if started {
                Err(ServiceStartError::persistent("licence not accepted"))
            } else {
                Ok(())
            }
        })
    });
    let controller = build(couchdb().startup_monitor(monitor), &fake);

    let result = controller.start_service(runtime.handle());

    assert!(matches!(
        result,
        Err(FixtainerError::Start(ServiceStartError::Persistent { .. }))
    ));
}

#[rstest]
fn without_detectors_the_service_is_ready_once_started(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::default());
    let controller = build(couchdb(), &fake);

    let service = controller
        .start_service(runtime.handle())
        .expect("service should start");

    assert!(service.is_started());
    assert!(matches!(
        controller.lifecycle().options().readiness(),
        Readiness::Immediate
    ));
}

#[rstest]
fn pull_policy_always_pulls(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::default());
    let controller = build(couchdb(), &fake);

    controller
        .start_service(runtime.handle())
        .expect("service should start");

    assert_eq!(fake.count(is_pull), 1);
}

#[rstest]
#[case::present_locally(false, 0)]
#[case::missing_locally(true, 1)]
fn without_pull_the_image_is_pulled_only_when_missing(
    runtime: tokio::runtime::Runtime,
    #[case] missing: bool,
    #[case] expected_pulls: usize,
) {
    let base = FakeRuntime::default();
    let fake = Arc::new(if missing { base.image_missing() } else { base });
    let controller = build(couchdb().pull(false), &fake);

    controller
        .start_service(runtime.handle())
        .expect("service should start");

    assert_eq!(fake.count(is_pull), expected_pulls);
}

#[rstest]
fn additional_run_settings_reach_the_create_body(runtime: tokio::runtime::Runtime) {
    let Value::Object(settings) = json!({"Env": ["COUCHDB_USER=admin", "COUCHDB_PASSWORD=secret"]})
    else {
        panic!("settings literal should be an object");
    };
    let fake = Arc::new(FakeRuntime::default());
    let controller = build(couchdb().additional_run_settings(settings), &fake);

    controller
        .start_service(runtime.handle())
        .expect("service should start");

    let body = fake.bodies().into_iter().next().expect("body should be captured");
    assert_eq!(
        body.env,
        Some(vec![
            String::from("COUCHDB_USER=admin"),
            String::from("COUCHDB_PASSWORD=secret"),
        ])
    );
}

#[rstest]
fn stopping_a_never_started_service_touches_nothing(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::default());
    let controller = build(couchdb(), &fake);
    let mut service = DockerisedService::default();

    controller
        .stop_service(runtime.handle(), &mut service)
        .expect("stop should succeed");

    assert!(fake.calls().is_empty());
}

#[rstest]
fn stopping_twice_removes_the_container_once(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::default());
    let controller = build(couchdb(), &fake);
    let mut service = controller
        .start_service(runtime.handle())
        .expect("service should start");

    controller
        .stop_service(runtime.handle(), &mut service)
        .expect("first stop should succeed");
    controller
        .stop_service(runtime.handle(), &mut service)
        .expect("second stop should succeed");

    assert!(!service.is_started());
    assert_eq!(fake.count(is_remove), 1);
}

#[rstest]
#[case::already_gone(404)]
#[case::already_stopped(304)]
fn benign_stop_responses_still_remove_the_container(
    runtime: tokio::runtime::Runtime,
    #[case] status_code: u16,
) {
    let fake = Arc::new(FakeRuntime::default().stop_fails_with(status_code));
    let controller = build(couchdb(), &fake);
    let mut service = controller
        .start_service(runtime.handle())
        .expect("service should start");

    controller
        .stop_service(runtime.handle(), &mut service)
        .expect("stop should tolerate the response");

    assert!(!service.is_started());
    assert_eq!(fake.count(is_remove), 1);
}

#[rstest]
fn removing_a_vanished_container_counts_as_stopped(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::default().remove_fails_with(404));
    let controller = build(couchdb(), &fake);
    let mut service = controller
        .start_service(runtime.handle())
        .expect("service should start");

    controller
        .stop_service(runtime.handle(), &mut service)
        .expect("stop should tolerate a missing container");

    assert!(!service.is_started());
}

#[rstest]
fn other_stop_failures_propagate_and_keep_the_container(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::default().stop_fails_with(500));
    let controller = build(couchdb(), &fake);
    let mut service = controller
        .start_service(runtime.handle())
        .expect("service should start");

    let result = controller.stop_service(runtime.handle(), &mut service);

    assert!(
        matches!(
            result,
            Err(FixtainerError::Container(ContainerError::StopFailed { .. }))
        ),
        "expected stop failure, got {result:?}"
    );
    assert!(service.is_started());
}

fn noop_monitor() -> StartupMonitor {
    StartupMonitor::new(|_service| Box::pin(async { Ok(()) }))
}

#[rstest]
#[case::monitor_and_start_detector(
    couchdb().startup_monitor(noop_monitor()).start_log_detector(ready_on("ready")),
    "startup_monitor",
    "start_log_detector"
)]
#[case::monitor_and_error_detector(
    couchdb().startup_monitor(noop_monitor()).transient_error_log_detector(ready_on("reset")),
    "startup_monitor",
    "transient_error_log_detector"
)]
#[case::monitor_and_http_detector(
    couchdb()
        .startup_monitor(noop_monitor())
        .start_http_detector(HttpDetector::success())
        .start_http_detection_endpoint("_up"),
    "startup_monitor",
    "start_http_detector"
)]
#[case::log_and_http(
    couchdb()
        .start_log_detector(ready_on("ready"))
        .start_http_detector(HttpDetector::success())
        .start_http_detection_endpoint("_up"),
    "start_log_detector",
    "start_http_detector"
)]
fn conflicting_readiness_options_are_rejected(
    #[case] builder: DockerisedControllerBuilder,
    #[case] expected_first: &str,
    #[case] expected_second: &str,
) {
    let error = build_error(builder);
    assert!(
        matches!(
            error,
            ConfigError::ConflictingOptions { ref first, ref second }
                if first == expected_first && second == expected_second
        ),
        "unexpected error: {error:?}"
    );
}

#[rstest]
#[case::detector_without_endpoint(
    couchdb().start_http_detector(HttpDetector::success()),
    "start_http_detector",
    "start_http_detection_endpoint"
)]
#[case::endpoint_without_detector(
    couchdb().start_http_detection_endpoint("_up"),
    "start_http_detection_endpoint",
    "start_http_detector"
)]
fn half_configured_options_are_rejected(
    #[case] builder: DockerisedControllerBuilder,
    #[case] expected_present: &str,
    #[case] expected_missing: &str,
) {
    let error = build_error(builder);
    assert!(
        matches!(
            error,
            ConfigError::IncompleteOption { ref present, ref missing }
                if present == expected_present && missing == expected_missing
        ),
        "unexpected error: {error:?}"
    );
}

#[rstest]
fn zero_start_tries_is_invalid() {
    let error = build_error(couchdb().start_tries(0));
    assert!(matches!(
        error,
        ConfigError::InvalidValue { ref field, .. } if field == "start_tries"
    ));
}

#[rstest]
fn http_detection_without_ports_is_invalid() {
    let builder = DockerisedControllerBuilder::<DockerisedService>::new("couchdb", "latest")
        .start_http_detector(HttpDetector::success())
        .start_http_detection_endpoint("_up");
    let error = build_error(builder);
    assert!(matches!(
        error,
        ConfigError::InvalidValue { ref field, .. } if field == "ports"
    ));
}

#[rstest]
fn empty_repository_is_missing() {
    let error = build_error(DockerisedControllerBuilder::new("  ", "latest"));
    assert!(matches!(
        error,
        ConfigError::MissingRequired { ref field } if field == "repository"
    ));
}

#[rstest]
fn rejected_configuration_never_reaches_the_engine() {
    let fake = Arc::new(FakeRuntime::default());
    let runtime: Arc<dyn ContainerRuntime> = Arc::clone(&fake) as Arc<dyn ContainerRuntime>;

    let result = couchdb()
        .startup_monitor(noop_monitor())
        .start_log_detector(ready_on("ready"))
        .build(runtime);

    assert!(result.is_err());
    assert!(fake.calls().is_empty());
}

/// Model carrying extra connection details next to the container state.
#[derive(Debug, Default)]
struct CouchDbService {
    inner: DockerisedService,
    user: String,
}

impl Service for CouchDbService {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn host(&self) -> &str {
        self.inner.host()
    }

    fn ports(&self) -> &BTreeMap<u16, u16> {
        self.inner.ports()
    }
}

impl AsRef<DockerisedService> for CouchDbService {
    fn as_ref(&self) -> &DockerisedService {
        &self.inner
    }
}

impl AsMut<DockerisedService> for CouchDbService {
    fn as_mut(&mut self) -> &mut DockerisedService {
        &mut self.inner
    }
}

#[rstest]
fn custom_models_are_populated_through_their_inner_service(runtime: tokio::runtime::Runtime) {
    let fake = Arc::new(FakeRuntime::with_outputs(&[&["ready"]]));
    let runtime_client: Arc<dyn ContainerRuntime> = Arc::clone(&fake) as Arc<dyn ContainerRuntime>;
    let controller = DockerisedControllerBuilder::<CouchDbService>::new("couchdb", "2.1")
        .ports([5984])
        .start_log_detector(ready_on("ready"))
        .build(runtime_client)
        .expect("controller should build");

    let mut service = controller
        .start_service(runtime.handle())
        .expect("service should start");
    service.user = String::from("admin");

    assert!(service.inner.is_started());
    assert!(service.host_port_is_published());
    assert_eq!(service.user, "admin");
}

impl CouchDbService {
    fn host_port_is_published(&self) -> bool {
        self.inner.host_port(5984).is_some()
    }
}
