// tests/stop_resume.rs

mod common;

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use common::{ExecutionLog, TestResult};
use jobdag::{Job, JobSet, JobStatus};

#[test]
fn stop_finishes_the_running_job_and_parks_the_rest() -> TestResult {
    let loader = common::single_worker_loader();
    let log = ExecutionLog::new();

    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let a = Job::new("A", JobSet::new(), move |_| {
        started_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        Ok(())
    });
    let b = log.job("B", JobSet::from([a.clone()]));

    let _task = loader.schedule(JobSet::from([a.clone(), b.clone()]), 0)?;
    loader.start();
    started_rx.recv()?;

    // stop() waits for A to finish, so release it from a helper thread.
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();
    });
    loader.stop();
    releaser.join().unwrap();

    // A ran to completion; B stayed pending.
    assert_eq!(a.status(), JobStatus::Success);
    assert_eq!(b.status(), JobStatus::Pending);
    assert!(log.entries().is_empty());
    Ok(())
}

#[test]
fn start_after_stop_resumes_pending_work() -> TestResult {
    let loader = common::single_worker_loader();
    let log = ExecutionLog::new();

    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let a = Job::new("A", JobSet::new(), move |_| {
        started_tx.send(()).unwrap();
        release_rx.recv().unwrap();
        Ok(())
    });
    let b = log.job("B", JobSet::from([a.clone()]));
    let c = log.job("C", JobSet::from([b.clone()]));

    let _task = loader.schedule(JobSet::from([a.clone(), b.clone(), c.clone()]), 0)?;
    loader.start();
    started_rx.recv()?;

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();
    });
    loader.stop();
    releaser.join().unwrap();
    assert_eq!(b.status(), JobStatus::Pending);

    loader.start();
    c.wait()?;

    assert_eq!(log.entries(), vec!["B", "C"]);
    assert_eq!(b.status(), JobStatus::Success);
    assert_eq!(c.status(), JobStatus::Success);
    Ok(())
}

#[test]
fn wait_drains_without_stopping() -> TestResult {
    let loader = common::single_worker_loader();
    let log = ExecutionLog::new();

    let a = log.job("A", JobSet::new());
    let b = log.job("B", JobSet::from([a.clone()]));
    let _task = loader.schedule(JobSet::from([a.clone(), b.clone()]), 0)?;

    loader.start();
    loader.wait();

    assert_eq!(log.entries(), vec!["A", "B"]);

    // The loader is still running: new work executes without another start.
    let c = log.job("C", JobSet::new());
    let _second = loader.schedule(JobSet::from([c.clone()]), 0)?;
    c.wait()?;
    Ok(())
}
