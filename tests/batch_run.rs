mod common;

use common::{FakeDriver, PageScript, mk_img};
use photoglot::batch::{Batch, JobInput};
use photoglot::config::Config;
use photoglot::detect::Completion;
use photoglot::driver::Probe;
use photoglot::report::BatchStatus;
use photoglot::util::hash_file;
use std::path::Path;
use std::time::Duration;

const FIRST_SELECTOR: &str = "input[type='file'][accept*='image']";

fn job_inputs(dir: &Path, n: usize) -> Vec<JobInput> {
    (0..n)
        .map(|i| {
            let filename = format!("page{}.png", i + 1);
            let path = dir.join(&filename);
            std::fs::write(&path, format!("img{i}")).expect("write input");
            let input_sha256 = hash_file(&path).expect("hash input");
            JobInput {
                index: i,
                filename,
                path,
                input_sha256,
            }
        })
        .collect()
}

fn ok_page() -> PageScript {
    ok_page_with_indicator_at(0)
}

fn ok_page_with_indicator_at(tick: u64) -> PageScript {
    PageScript::translate_page()
        .with_upload(FIRST_SELECTOR)
        .with_element(
            Probe::text(Some("button"), "Download translation"),
            true,
            Some(tick),
        )
        .with_images(vec![
            mk_img(0, Some("blob:upload"), 100.0, 600.0, 400.0),
            mk_img(1, Some("https://lh3.googleusercontent.com/a"), 1200.0, 600.0, 400.0),
        ])
        .with_canvas("data:image/png;base64,aGVsbG8=")
}

#[tokio::test(start_paused = true)]
async fn failed_job_does_not_stop_batch() {
    let cfg = Config::default();
    let dir = tempfile::tempdir().expect("tempdir");
    let inputs = job_inputs(dir.path(), 3);

    // The middle page exposes no upload control at all.
    let driver = FakeDriver::with_jobs(vec![ok_page(), PageScript::translate_page(), ok_page()]);
    let batch = Batch::new(&cfg, driver.clone());

    let output = batch.run(&inputs, "auto", "en").await.expect("batch");

    assert_eq!(output.jobs.len(), 3);
    assert!(output.jobs[0].record.ok);
    assert!(!output.jobs[1].record.ok);
    assert!(output.jobs[2].record.ok);
    assert_eq!(
        output.jobs[1].record.error_kind.as_deref(),
        Some("upload_not_found")
    );
    for (i, job) in output.jobs.iter().enumerate() {
        assert_eq!(job.record.index, i);
        assert_eq!(job.record.filename, format!("page{}.png", i + 1));
    }
    assert_eq!(output.status(), BatchStatus::Partial);
    assert_eq!(driver.acquired(), 3);
    assert_eq!(driver.closed(), 3);
}

#[tokio::test(start_paused = true)]
async fn every_stage_failure_is_isolated_and_released() {
    let cfg = Config::default();
    let dir = tempfile::tempdir().expect("tempdir");
    let inputs = job_inputs(dir.path(), 5);

    let goto_fails = {
        let mut p = PageScript::translate_page();
        p.fail_goto = Some("dns".into());
        p
    };
    let dispatch_fails = {
        let mut p = PageScript::translate_page().with_upload(FIRST_SELECTOR);
        p.fail_set_files = true;
        p
    };
    let rejected = {
        let mut p = PageScript::translate_page().with_upload(FIRST_SELECTOR);
        p.visible_text = "No text found".into();
        p
    };
    let capture_fails = PageScript::translate_page()
        .with_upload(FIRST_SELECTOR)
        .with_element(Probe::text(Some("button"), "Copy text"), true, Some(0))
        .with_images(vec![mk_img(
            0,
            Some("https://lh3.googleusercontent.com/a"),
            1200.0,
            600.0,
            400.0,
        )]);

    let driver = FakeDriver::with_jobs(vec![
        PageScript::failing_acquire("spawn failed"),
        goto_fails,
        dispatch_fails,
        rejected,
        capture_fails,
    ]);
    let batch = Batch::new(&cfg, driver.clone());

    let output = batch.run(&inputs, "auto", "en").await.expect("batch");

    let kinds: Vec<_> = output
        .jobs
        .iter()
        .map(|j| j.record.error_kind.clone().expect("error kind"))
        .collect();
    assert_eq!(
        kinds,
        [
            "session_start",
            "navigation",
            "upload_not_found",
            "translation_rejected",
            "extraction_exhausted",
        ]
    );

    // Job 1 never had a session; the other four were released exactly once.
    assert_eq!(driver.acquired(), 4);
    assert_eq!(driver.closed(), 4);
    assert!(
        !output.jobs[0]
            .record
            .trail
            .iter()
            .any(|t| t.step == "session.release")
    );
    for job in &output.jobs[1..] {
        assert!(job.record.trail.iter().any(|t| t.step == "session.release"));
    }

    assert!(matches!(
        output.jobs[3].record.completion,
        Some(Completion::Failed { .. })
    ));
    assert_eq!(output.status(), BatchStatus::AllFailed);
    assert_eq!(output.succeeded(), 0);
}

#[tokio::test(start_paused = true)]
async fn sequential_pacing_and_mixed_outcomes() {
    let mut cfg = Config::default();
    cfg.navigation.settle_seconds = 0;
    cfg.navigation.tab_text = String::new();
    cfg.upload.post_upload_delay_seconds = 0;
    cfg.detection.post_detect_delay_seconds = 0;

    let dir = tempfile::tempdir().expect("tempdir");
    let inputs = job_inputs(dir.path(), 2);

    let rejected = {
        let mut p = PageScript::translate_page().with_upload(FIRST_SELECTOR);
        p.visible_text = "no text found".into();
        p
    };
    let driver = FakeDriver::with_jobs(vec![ok_page_with_indicator_at(3), rejected]);
    let batch = Batch::new(&cfg, driver.clone());

    let started = tokio::time::Instant::now();
    let output = batch.run(&inputs, "ja", "en").await.expect("batch");
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(1),
        "inter-job delay observed: {elapsed:?}"
    );

    assert_eq!(output.jobs.len(), 2);

    let first = &output.jobs[0];
    assert!(first.record.ok);
    assert_eq!(first.image.as_deref(), Some(b"hello".as_slice()));
    assert_eq!(first.record.input_sha256, inputs[0].input_sha256);
    assert!(matches!(
        first.record.completion,
        Some(Completion::Detected { tick: 3, .. })
    ));

    let second = &output.jobs[1];
    assert!(!second.record.ok);
    assert_eq!(
        second.record.error_kind.as_deref(),
        Some("translation_rejected")
    );
    assert!(
        second
            .record
            .error
            .as_deref()
            .expect("error message")
            .contains("no text found")
    );
    assert!(second.image.is_none());

    assert_eq!(output.status(), BatchStatus::Partial);
    assert_eq!(driver.closed(), 2);

    let manifest = output.manifest("test-batch");
    assert_eq!(manifest.total, 2);
    assert_eq!(manifest.succeeded, 1);
    assert_eq!(manifest.failed, 1);
    assert_eq!(manifest.jobs.len(), 2);
}
