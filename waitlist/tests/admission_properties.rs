//! Admission invariants under concurrency.
//!
//! - A code admits at most one registrant
//! - Event ids are unique and gap-free when nothing fails
//! - An email is registered at most once
//! - Losing admissions leave their codes usable
//! - The late cutoff is enforced

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use waitlist::admission::{
    AdmissionEnvironment, AdmissionError, AdmissionPolicy, AdmissionService, RejectionReason,
};
use waitlist::codes::{CodeStore, InMemoryCodeStore, SeedOutcome};
use waitlist::ledger::{InMemoryRegistrantLedger, RegistrantLedger};
use waitlist::mocks::{CollidingLedger, RecordingNotifier, StaticRenderer};
use waitlist::types::{CodePool, RegistrationForm};
use waitlist_testing::{FixedClock, utc};

struct Fixture {
    service: AdmissionService,
    codes: Arc<InMemoryCodeStore>,
    ledger: Arc<dyn RegistrantLedger>,
}

async fn fixture_at(now: DateTime<Utc>, standard: &[String], late: &[String]) -> Fixture {
    fixture_with_ledger(now, standard, late, Arc::new(InMemoryRegistrantLedger::default())).await
}

async fn fixture_with_ledger(
    now: DateTime<Utc>,
    standard: &[String],
    late: &[String],
    ledger: Arc<dyn RegistrantLedger>,
) -> Fixture {
    let clock = Arc::new(FixedClock::new(now));
    let codes = Arc::new(InMemoryCodeStore::new(clock.clone(), chrono::Duration::minutes(10)));
    codes.seed(CodePool::Standard, standard).await.unwrap();
    codes.seed(CodePool::Late, late).await.unwrap();

    let env = AdmissionEnvironment {
        clock,
        codes: codes.clone(),
        ledger: ledger.clone(),
        renderer: Arc::new(StaticRenderer::new()),
        notifier: Arc::new(RecordingNotifier::new()),
        policy: AdmissionPolicy::new(utc(2025, 7, 1, 0)),
    };
    Fixture {
        service: AdmissionService::new(env, Duration::from_secs(10)),
        codes,
        ledger,
    }
}

fn before_cutoff() -> DateTime<Utc> {
    utc(2025, 6, 15, 12)
}

fn form(email: &str, code: &str, late_code: Option<&str>) -> RegistrationForm {
    RegistrationForm {
        name: "Test Registrant".into(),
        email: email.into(),
        phone_number: "08000000000".into(),
        state: "Edo".into(),
        code: code.into(),
        late_code: late_code.map(str::to_string),
        photo_reference: None,
    }
}

fn codes(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{prefix}{i:03}")).collect()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

/// Run `forms` as concurrent admissions.
async fn admit_all(
    service: &AdmissionService,
    forms: Vec<RegistrationForm>,
) -> Vec<Result<waitlist::admission::AdmissionOutcome, AdmissionError>> {
    let handles: Vec<_> = forms
        .into_iter()
        .map(|form| {
            let service = service.clone();
            tokio::spawn(async move { service.admit(form).await })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn one_code_admits_exactly_one_registrant(n in 2usize..=50) {
        runtime().block_on(async {
            let f = fixture_at(before_cutoff(), &["SHARED".to_string()], &[]).await;
            let forms = (0..n).map(|i| form(&format!("user{i}@x.com"), "SHARED", None)).collect();

            let results = admit_all(&f.service, forms).await;

            let admitted = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(admitted, 1);
            assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
                r,
                Err(AdmissionError::Rejected(RejectionReason::InvalidCode))
            )));
            assert_eq!(f.ledger.count().await.unwrap(), 1);
            assert!(!f.codes.is_valid(CodePool::Standard, "SHARED").await.unwrap());
        });
    }

    #[test]
    fn concurrent_admissions_get_unique_sequential_ids(n in 2usize..=50) {
        runtime().block_on(async {
            let pool = codes("C", n);
            let f = fixture_at(before_cutoff(), &pool, &[]).await;
            let forms = pool
                .iter()
                .enumerate()
                .map(|(i, code)| form(&format!("user{i}@x.com"), code, None))
                .collect();

            let results = admit_all(&f.service, forms).await;

            let ids: BTreeSet<String> = results
                .into_iter()
                .map(|r| r.unwrap().registrant.event_id.to_string())
                .collect();
            let expected: BTreeSet<String> = (1..=n).map(|i| format!("edo-ahapn-{i:04}")).collect();
            assert_eq!(ids, expected);
            assert_eq!(f.codes.count(CodePool::Standard).await.unwrap(), 0);
        });
    }

    #[test]
    fn one_email_is_registered_once(n in 2usize..=50) {
        runtime().block_on(async {
            let pool = codes("E", n);
            let f = fixture_at(before_cutoff(), &pool, &[]).await;
            let forms = pool.iter().map(|code| form("same@x.com", code, None)).collect();

            let results = admit_all(&f.service, forms).await;

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
                r,
                Err(AdmissionError::Rejected(RejectionReason::DuplicateEmail))
            )));
            assert_eq!(f.ledger.count().await.unwrap(), 1);
            // Every losing admission released its code
            assert_eq!(f.codes.count(CodePool::Standard).await.unwrap(), (n - 1) as u64);
            for code in &pool {
                let used = f.ledger.all().await.unwrap()[0].submitted_code == *code;
                assert_eq!(f.codes.is_valid(CodePool::Standard, code).await.unwrap(), !used);
            }
        });
    }
}

#[tokio::test]
async fn end_to_end_scenario() {
    let f = fixture_at(before_cutoff(), &["A1".to_string(), "A2".to_string()], &[]).await;

    let outcome = f.service.admit(form("jane@x.com", "A1", None)).await.unwrap();
    assert_eq!(outcome.event_id().as_str(), "edo-ahapn-0001");
    assert!(!f.codes.is_valid(CodePool::Standard, "A1").await.unwrap());

    assert!(matches!(
        f.service.admit(form("john@x.com", "A1", None)).await,
        Err(AdmissionError::Rejected(RejectionReason::InvalidCode))
    ));
    assert!(matches!(
        f.service.admit(form("jane@x.com", "A2", None)).await,
        Err(AdmissionError::Rejected(RejectionReason::DuplicateEmail))
    ));
    assert!(f.codes.is_valid(CodePool::Standard, "A2").await.unwrap());
}

#[tokio::test]
async fn seeding_twice_changes_nothing() {
    let f = fixture_at(before_cutoff(), &codes("S", 5), &[]).await;

    let again = f.codes.seed(CodePool::Standard, &codes("T", 3)).await.unwrap();

    assert_eq!(again, SeedOutcome::AlreadySeeded(5));
    assert_eq!(f.codes.count(CodePool::Standard).await.unwrap(), 5);
    assert!(!f.codes.is_valid(CodePool::Standard, "T000").await.unwrap());
}

#[tokio::test]
async fn used_codes_stay_used_when_seeding_runs_again() {
    let f = fixture_at(before_cutoff(), &["A1".to_string()], &[]).await;
    f.service.admit(form("jane@x.com", "A1", None)).await.unwrap();

    // Startup seeding on the next boot
    let again = f.codes.seed(CodePool::Standard, &["A1".to_string()]).await.unwrap();

    assert_eq!(again, SeedOutcome::AlreadySeeded(0));
    assert!(matches!(
        f.service.admit(form("john@x.com", "A1", None)).await,
        Err(AdmissionError::Rejected(RejectionReason::InvalidCode))
    ));
}

#[tokio::test]
async fn late_period_requires_a_valid_late_code() {
    let after_cutoff = utc(2025, 7, 2, 9);
    let f = fixture_at(after_cutoff, &codes("S", 3), &["L1".to_string()]).await;

    assert!(matches!(
        f.service.admit(form("a@x.com", "S000", None)).await,
        Err(AdmissionError::Rejected(RejectionReason::LateCodeRequired))
    ));
    assert!(matches!(
        f.service.admit(form("b@x.com", "S000", Some("NOPE"))).await,
        Err(AdmissionError::Rejected(RejectionReason::InvalidLateCode))
    ));
    // Neither rejection used up the standard code
    assert!(f.codes.is_valid(CodePool::Standard, "S000").await.unwrap());

    let outcome = f.service.admit(form("c@x.com", "S000", Some("L1"))).await.unwrap();
    assert_eq!(outcome.registrant.late_code.as_deref(), Some("L1"));
    assert!(!f.codes.is_valid(CodePool::Standard, "S000").await.unwrap());
    assert!(!f.codes.is_valid(CodePool::Late, "L1").await.unwrap());
}

#[tokio::test]
async fn late_code_is_not_checked_before_cutoff() {
    let f = fixture_at(before_cutoff(), &codes("S", 1), &["L1".to_string()]).await;

    let outcome = f.service.admit(form("a@x.com", "S000", Some("BOGUS"))).await.unwrap();

    assert_eq!(outcome.registrant.late_code, None);
    assert!(f.codes.is_valid(CodePool::Late, "L1").await.unwrap());
}

#[tokio::test]
async fn identifier_collisions_are_retried_invisibly() {
    let ledger = Arc::new(CollidingLedger::new(InMemoryRegistrantLedger::default(), 2));
    let f = fixture_with_ledger(before_cutoff(), &codes("R", 1), &[], ledger).await;

    let outcome = f.service.admit(form("a@x.com", "R000", None)).await.unwrap();

    assert_eq!(outcome.event_id().as_str(), "edo-ahapn-0003");
    assert_eq!(f.ledger.count().await.unwrap(), 1);
}
