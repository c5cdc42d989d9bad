//! Cross-service behavior of the use-case layer against in-memory ports.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use beacon_application::{
    AggregationEngine, DiagnosisOutcome, DiagnosisService, EmailWorker, ErrorReport,
    IngestionService, ResolveWorker,
};
use beacon_domain::entities::ErrorType;
use beacon_domain::error::Result;
use beacon_domain::ports::{
    AlertEmail, ErrorAnalyzer, JobHandler, OriginalPosition, QueueName, SourceContext, priority,
};

use beacon_application::testing::{
    CannedAnalyzer, EmptyArchive, FixedResolver, MemAggregationRepo, MemErrorLogRepo, MemLogStore,
    MemProjectRepo, MemSourceCodeRepo, RecordingMailer, RecordingQueue, job,
};

fn report(user: &str) -> ErrorReport {
    ErrorReport {
        project_id: "p1".to_owned(),
        error_type: ErrorType::JsError,
        error_message: "TypeError: x is undefined".to_owned(),
        error_stack: Some("at foo (a.js:10:5)".to_owned()),
        page_url: None,
        user_id: Some(user.to_owned()),
        user_agent: None,
        device_info: None,
        network_info: None,
        performance_data: None,
        source_file: None,
        source_line: None,
        source_column: None,
        project_version: None,
        build_id: None,
        error_level: Some(2),
    }
}

struct Pipeline {
    logs: Arc<MemErrorLogRepo>,
    aggregations: Arc<MemAggregationRepo>,
    queues: Arc<RecordingQueue>,
    log_store: Arc<MemLogStore>,
    ingestion: IngestionService,
    engine: AggregationEngine,
}

fn pipeline(alert_threshold: u64) -> Pipeline {
    let logs = Arc::new(MemErrorLogRepo::default());
    let aggregations = Arc::new(MemAggregationRepo::default());
    let projects = Arc::new(MemProjectRepo::with_project("p1", alert_threshold, 1.0));
    let queues = Arc::new(RecordingQueue::default());
    let log_store = Arc::new(MemLogStore::default());

    let ingestion = IngestionService::new(
        logs.clone(),
        log_store.clone(),
        queues.clone(),
        projects.clone(),
    );
    let engine = AggregationEngine::new(
        logs.clone(),
        aggregations.clone(),
        projects,
        queues.clone(),
    );
    Pipeline {
        logs,
        aggregations,
        queues,
        log_store,
        ingestion,
        engine,
    }
}

#[tokio::test]
async fn ingestion_to_aggregation_rolls_up_two_users() {
    let p = pipeline(100);

    let id1 = p.ingestion.report_one(report("u1")).await.unwrap().unwrap();
    let id2 = p.ingestion.report_one(report("u2")).await.unwrap().unwrap();
    assert_ne!(id1, id2);

    // intake fanned out: processing + sourcemap (no sourceFile, has stack) + aggregation
    assert_eq!(p.queues.count(QueueName::ErrorProcessing), 2);
    assert_eq!(p.queues.count(QueueName::SourcemapProcessing), 2);
    assert_eq!(p.queues.count(QueueName::ErrorAggregation), 2);
    assert_eq!(*p.log_store.inserted.lock().unwrap(), 2);

    let groups = p.engine.run("p1").await.unwrap();
    assert_eq!(groups, 1);

    let rows = p.aggregations.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    let agg = &rows[0];
    assert_eq!(agg.occurrence_count, 2);
    assert_eq!(agg.affected_users, 2);
    assert!(agg.first_seen <= agg.last_seen);
    drop(rows);

    // every log carries the same fingerprint and is now processed
    let logs = p.logs.rows.lock().unwrap();
    assert!(logs.iter().all(|l| l.is_processed));
    assert_eq!(logs[0].error_hash, logs[1].error_hash);
}

#[tokio::test]
async fn aggregation_rerun_counts_nothing_twice() {
    let p = pipeline(100);
    p.ingestion.report_one(report("u1")).await.unwrap();
    p.ingestion.report_one(report("u2")).await.unwrap();

    p.engine.run("p1").await.unwrap();
    let first = p.aggregations.rows.lock().unwrap()[0].occurrence_count;

    // processed flag keeps the second run empty
    let groups = p.engine.run("p1").await.unwrap();
    assert_eq!(groups, 0);
    assert_eq!(p.aggregations.rows.lock().unwrap()[0].occurrence_count, first);
}

#[tokio::test]
async fn threshold_crossing_enqueues_one_high_priority_alert() {
    let p = pipeline(2);
    p.ingestion.report_one(report("u1")).await.unwrap();
    p.ingestion.report_one(report("u2")).await.unwrap();
    p.engine.run("p1").await.unwrap();

    let added = p.queues.added.lock().unwrap();
    let alerts: Vec<_> = added
        .iter()
        .filter(|(q, t, ..)| *q == QueueName::EmailNotification && t == "send-alert-email")
        .collect();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].3, priority::HIGH);
    drop(added);

    // another occurrence stays above the threshold without re-alerting
    p.ingestion.report_one(report("u3")).await.unwrap();
    p.engine.run("p1").await.unwrap();
    assert_eq!(p.queues.count(QueueName::EmailNotification), 1);
}

#[tokio::test]
async fn batch_over_limit_is_rejected() {
    let p = pipeline(100);
    let batch: Vec<ErrorReport> = (0..501).map(|i| report(&format!("u{i}"))).collect();
    let err = p.ingestion.report_batch(batch).await.unwrap_err();
    assert!(matches!(err, beacon_domain::Error::BadRequest { .. }));
    assert!(p.logs.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn batch_persists_atomically_and_reports_rows() {
    let p = pipeline(100);
    let outcomes = p
        .ingestion
        .report_batch(vec![report("u1"), report("u2"), report("u3")])
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| o.enqueued));
    assert_eq!(p.logs.rows.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn columnar_outage_does_not_fail_intake() {
    let logs = Arc::new(MemErrorLogRepo::default());
    let queues = Arc::new(RecordingQueue::default());
    let projects = Arc::new(MemProjectRepo::with_project("p1", 100, 1.0));
    let log_store = Arc::new(MemLogStore {
        fail_inserts: true,
        ..MemLogStore::default()
    });
    let ingestion = IngestionService::new(logs.clone(), log_store, queues, projects);

    let id = ingestion.report_one(report("u1")).await.unwrap();
    assert!(id.is_some());
    assert_eq!(logs.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn sampling_zero_drops_everything() {
    let logs = Arc::new(MemErrorLogRepo::default());
    let queues = Arc::new(RecordingQueue::default());
    let projects = Arc::new(MemProjectRepo::with_project("p1", 100, 0.0));
    let ingestion = IngestionService::new(
        logs.clone(),
        Arc::new(MemLogStore::default()),
        queues.clone(),
        projects,
    );

    let id = ingestion.report_one(report("u1")).await.unwrap();
    assert!(id.is_none());
    assert!(logs.rows.lock().unwrap().is_empty());
    assert_eq!(p_count(&queues), 0);
}

fn p_count(queues: &RecordingQueue) -> usize {
    queues.added.lock().unwrap().len()
}

#[tokio::test]
async fn resolve_worker_writes_original_location_back() {
    let p = pipeline(100);
    let id = p.ingestion.report_one(report("u1")).await.unwrap().unwrap();

    let resolver = Arc::new(FixedResolver {
        position: Some(OriginalPosition {
            source: "src/a.ts".to_owned(),
            line: 42,
            column: 3,
            name: Some("foo".to_owned()),
        }),
        context: Some(SourceContext {
            lines: vec!["const x = user.profile;".to_owned()],
            start_line: 42,
        }),
    });
    let worker = ResolveWorker::new(
        p.logs.clone(),
        resolver,
        Arc::new(MemSourceCodeRepo::with_active("p1", "1.0.0")),
    );

    let mutated = worker.run(id).await.unwrap();
    assert!(mutated);

    let logs = p.logs.rows.lock().unwrap();
    let log = logs.iter().find(|l| l.id == id).unwrap();
    assert_eq!(log.original_source.as_deref(), Some("src/a.ts"));
    assert_eq!(log.original_line, Some(42));
    assert_eq!(log.original_column, Some(3));
    assert_eq!(log.function_name.as_deref(), Some("foo"));
    assert!(log.is_source_resolved);
    assert!(log.source_snippet.as_deref().unwrap().contains("user.profile"));
    drop(logs);

    // duplicate delivery is a clean no-op
    let mutated = worker.run(id).await.unwrap();
    assert!(!mutated);
}

#[tokio::test]
async fn resolve_worker_succeeds_without_map_or_version() {
    let p = pipeline(100);
    let id = p.ingestion.report_one(report("u1")).await.unwrap().unwrap();

    // no active version at all
    let worker = ResolveWorker::new(
        p.logs.clone(),
        Arc::new(FixedResolver {
            position: None,
            context: None,
        }),
        Arc::new(MemSourceCodeRepo::empty()),
    );
    assert!(!worker.run(id).await.unwrap());

    // version exists but no map covers the frame
    let worker = ResolveWorker::new(
        p.logs.clone(),
        Arc::new(FixedResolver {
            position: None,
            context: None,
        }),
        Arc::new(MemSourceCodeRepo::with_active("p1", "1.0.0")),
    );
    assert!(!worker.run(id).await.unwrap());
    assert!(!p.logs.rows.lock().unwrap()[0].is_source_resolved);
}

/// Analyzer whose summary carries the call number, for history-ring tests
struct CountingAnalyzer {
    calls: Mutex<u32>,
}

#[async_trait]
impl ErrorAnalyzer for CountingAnalyzer {
    async fn analyze(&self, _prompt: &str) -> Result<String> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        Ok(format!(
            r#"{{"rootCause": "cause {n}", "summary": "diagnosis {n}"}}"#,
            n = *calls
        ))
    }

    fn is_enabled(&self) -> bool {
        true
    }
}

fn diagnosis_service(
    p: &Pipeline,
    analyzer: Arc<dyn ErrorAnalyzer>,
) -> DiagnosisService {
    DiagnosisService::new(
        p.aggregations.clone(),
        p.logs.clone(),
        Arc::new(EmptyArchive),
        Arc::new(FixedResolver {
            position: None,
            context: None,
        }),
        Arc::new(MemSourceCodeRepo::with_active("p1", "1.0.0")),
        analyzer,
    )
}

#[tokio::test]
async fn diagnosis_without_force_runs_once() {
    let p = pipeline(100);
    p.ingestion.report_one(report("u1")).await.unwrap();
    p.engine.run("p1").await.unwrap();
    let agg_id = p.aggregations.rows.lock().unwrap()[0].id;

    let analyzer = Arc::new(CannedAnalyzer::json("the diagnosis"));
    let service = diagnosis_service(&p, analyzer.clone());

    let outcome = service.analyze_aggregation(agg_id, false).await.unwrap();
    assert_eq!(outcome, DiagnosisOutcome::Completed);
    let outcome = service.analyze_aggregation(agg_id, false).await.unwrap();
    assert_eq!(outcome, DiagnosisOutcome::Skipped);
    assert_eq!(*analyzer.calls.lock().unwrap(), 1);

    let rows = p.aggregations.rows.lock().unwrap();
    assert_eq!(rows[0].ai_diagnosis.as_deref(), Some("the diagnosis"));
    assert_eq!(rows[0].ai_fix_suggestion.as_deref(), Some("fix it"));
    // the ring records the active diagnosis too, and the skip added nothing
    assert_eq!(rows[0].ai_diagnosis_history.len(), 1);
    assert!(rows[0].comprehensive_analysis_report.is_some());
    drop(rows);

    // the diagnosis was mirrored onto the source log
    let logs = p.logs.rows.lock().unwrap();
    assert_eq!(logs[0].ai_diagnosis.as_deref(), Some("the diagnosis"));
    assert!(logs[0].comprehensive_analysis_generated_at.is_some());
}

#[tokio::test]
async fn reanalyze_eleven_times_keeps_ten_history_entries() {
    let p = pipeline(100);
    p.ingestion.report_one(report("u1")).await.unwrap();
    p.engine.run("p1").await.unwrap();
    let agg_id = p.aggregations.rows.lock().unwrap()[0].id;

    let service = diagnosis_service(
        &p,
        Arc::new(CountingAnalyzer {
            calls: Mutex::new(0),
        }),
    );
    for _ in 0..11 {
        let outcome = service.analyze_aggregation(agg_id, true).await.unwrap();
        assert_eq!(outcome, DiagnosisOutcome::Completed);
    }

    let rows = p.aggregations.rows.lock().unwrap();
    let history = &rows[0].ai_diagnosis_history;
    assert_eq!(history.len(), 10);
    // entries 2..=11 survive; entry 1 fell off the ring
    assert_eq!(history[0].analysis, "diagnosis 2");
    assert_eq!(history[9].analysis, "diagnosis 11");
    assert_eq!(rows[0].ai_diagnosis.as_deref(), Some("diagnosis 11"));
}

#[tokio::test]
async fn disabled_analyzer_skips_without_touching_the_row() {
    let p = pipeline(100);
    p.ingestion.report_one(report("u1")).await.unwrap();
    p.engine.run("p1").await.unwrap();
    let agg_id = p.aggregations.rows.lock().unwrap()[0].id;

    let analyzer = Arc::new(CannedAnalyzer {
        enabled: false,
        ..CannedAnalyzer::json("x")
    });
    let service = diagnosis_service(&p, analyzer.clone());
    let outcome = service.analyze_aggregation(agg_id, true).await.unwrap();
    assert_eq!(outcome, DiagnosisOutcome::Disabled);
    assert_eq!(*analyzer.calls.lock().unwrap(), 0);
    assert!(p.aggregations.rows.lock().unwrap()[0].ai_diagnosis.is_none());
}

#[tokio::test]
async fn email_worker_delivers_decoded_alert() {
    let mailer = Arc::new(RecordingMailer::default());
    let worker = EmailWorker::new(mailer.clone());
    let alert = AlertEmail {
        project_id: "p1".to_owned(),
        error_hash: "h".to_owned(),
        error_message: "boom".to_owned(),
        occurrence_count: 5,
        threshold: 5,
    };
    let payload = serde_json::to_value(&alert).unwrap();
    worker
        .handle(&job(QueueName::EmailNotification, payload))
        .await
        .unwrap();
    assert_eq!(mailer.alerts.lock().unwrap().len(), 1);

    // malformed payloads are rejected, not retried into oblivion
    let err = worker
        .handle(&job(QueueName::EmailNotification, serde_json::json!({})))
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
}
