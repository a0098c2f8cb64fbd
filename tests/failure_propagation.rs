// tests/failure_propagation.rs

mod common;

use common::TestResult;
use jobdag::{Job, JobSet, JobStatus, LoadError};

#[test]
fn failure_fans_out_to_transitive_dependents() -> TestResult {
    let loader = common::single_worker_loader();

    let a = Job::new("A", JobSet::new(), |_| anyhow::bail!("disk on fire"));
    let b = Job::new("B", JobSet::from([a.clone()]), |_| Ok(()));
    let c = Job::new("C", JobSet::from([b.clone()]), |_| Ok(()));

    let _task = loader.schedule(JobSet::from([a.clone(), b.clone(), c.clone()]), 0)?;
    loader.start();

    let err_a = a.wait().unwrap_err();
    assert!(matches!(err_a, LoadError::LoadFailed { .. }));
    assert!(err_a.to_string().contains("disk on fire"));

    // B's failure names B and quotes A's failure.
    let err_b = b.wait().unwrap_err();
    assert!(matches!(
        &err_b,
        LoadError::DependencyFailed { job, .. } if job == "B"
    ));
    assert!(err_b.to_string().contains("'A'"));

    // C's failure names C and quotes B's failure.
    let err_c = c.wait().unwrap_err();
    assert!(matches!(
        &err_c,
        LoadError::DependencyFailed { job, .. } if job == "C"
    ));
    assert!(err_c.to_string().contains("'B'"));

    for job in [&a, &b, &c] {
        assert_eq!(job.status(), JobStatus::Failed);
    }
    Ok(())
}

#[test]
fn siblings_of_a_failed_job_still_run() -> TestResult {
    let loader = common::single_worker_loader();

    let bad = Job::new("bad", JobSet::new(), |_| anyhow::bail!("nope"));
    let good = Job::new("good", JobSet::new(), |_| Ok(()));

    let _task = loader.schedule(JobSet::from([bad.clone(), good.clone()]), 0)?;
    loader.start();

    bad.wait_no_throw();
    good.wait()?;

    assert_eq!(bad.status(), JobStatus::Failed);
    assert_eq!(good.status(), JobStatus::Success);
    Ok(())
}

#[test]
fn panicking_body_is_captured_as_failure() -> TestResult {
    let loader = common::single_worker_loader();

    let a = Job::new("A", JobSet::new(), |_| panic!("boom"));
    let b = Job::new("B", JobSet::from([a.clone()]), |_| Ok(()));

    let _task = loader.schedule(JobSet::from([a.clone(), b.clone()]), 0)?;
    loader.start();

    let err = a.wait().unwrap_err();
    assert!(matches!(err, LoadError::LoadFailed { .. }));
    assert!(err.to_string().contains("boom"));

    let err_b = b.wait().unwrap_err();
    assert!(matches!(err_b, LoadError::DependencyFailed { .. }));

    // The loader itself survives and keeps executing new work.
    let after = Job::new("after", JobSet::new(), |_| Ok(()));
    let _second = loader.schedule(JobSet::from([after.clone()]), 0)?;
    after.wait()?;
    Ok(())
}

#[test]
fn scheduling_against_a_failed_prerequisite_fails_the_dependent() -> TestResult {
    let loader = common::single_worker_loader();

    let a = Job::new("A", JobSet::new(), |_| anyhow::bail!("nope"));
    let _first = loader.schedule(JobSet::from([a.clone()]), 0)?;
    loader.start();
    a.wait_no_throw();
    loader.wait();

    // A is finished-failed; B schedules but is failed immediately, and its
    // co-scheduled dependent C carries the chained failure.
    let b = Job::new("B", JobSet::from([a.clone()]), |_| Ok(()));
    let c = Job::new("C", JobSet::from([b.clone()]), |_| Ok(()));
    let _second = loader.schedule(JobSet::from([b.clone(), c.clone()]), 0)?;

    let err_b = b.wait().unwrap_err();
    assert!(matches!(err_b, LoadError::DependencyFailed { .. }));
    assert!(err_b.to_string().contains("'A'"));

    let err_c = c.wait().unwrap_err();
    assert!(matches!(err_c, LoadError::DependencyFailed { .. }));
    assert!(err_c.to_string().contains("'B'"));
    Ok(())
}

#[test]
fn wait_returns_normally_only_on_success() -> TestResult {
    let loader = common::single_worker_loader();

    let ok = Job::new("ok", JobSet::new(), |_| Ok(()));
    let bad = Job::new("bad", JobSet::new(), |_| anyhow::bail!("sad"));

    let _task = loader.schedule(JobSet::from([ok.clone(), bad.clone()]), 0)?;
    loader.start();

    ok.wait()?;
    assert_eq!(ok.status(), JobStatus::Success);

    assert!(bad.wait().is_err());
    assert_eq!(bad.status(), JobStatus::Failed);

    // wait can be called again; the captured failure is stable.
    assert!(bad.wait().is_err());
    bad.wait_no_throw();
    Ok(())
}
