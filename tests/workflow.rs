mod common;

use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use carelink::care::directory::{self, NewPerson};
use carelink::care::{links, requests, workflow, CareError, CareResult, PersonType, RequestStatus};
use carelink::db::PgPool;
use common::{acquire_db_lock, TestApp};
use diesel::{Connection, PgConnection};

fn person<'a>(email: &'a str, password: &'a str) -> NewPerson<'a> {
    NewPerson {
        email,
        password,
        first_name: "Sam",
        last_name: "Lee",
        phone_number: None,
    }
}

/// Runs `hold` inside a transaction that stays open while `contend` runs on a
/// second connection, so the pre-checks in `contend` cannot see the held row
/// and only the table constraint can stop it.
fn contend_with_uncommitted<T, U>(
    pool: &PgPool,
    hold: impl FnOnce(&mut PgConnection) -> CareResult<T> + Send,
    contend: impl FnOnce(&mut PgConnection) -> CareResult<U> + Send,
) -> Result<(CareResult<T>, CareResult<U>)>
where
    T: Send,
    U: Send,
{
    let mut holder_conn = pool.get()?;
    let mut contender_conn = pool.get()?;
    let barrier = Barrier::new(2);

    thread::scope(|scope| {
        let holder = scope.spawn(|| {
            let conn: &mut PgConnection = &mut holder_conn;
            conn.transaction::<T, CareError, _>(|conn| {
                let held = hold(conn);
                barrier.wait();
                let value = held?;
                thread::sleep(Duration::from_millis(400));
                Ok(value)
            })
        });
        let contender = scope.spawn(|| {
            barrier.wait();
            contend(&mut contender_conn)
        });

        let held = holder
            .join()
            .map_err(|_| anyhow!("holding thread panicked"))?;
        let contended = contender
            .join()
            .map_err(|_| anyhow!("contending thread panicked"))?;
        Ok((held, contended))
    })
}

#[tokio::test]
async fn accepting_after_direct_assignment_is_idempotent() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.with_conn(|conn| {
        let patient = workflow::register(conn, PersonType::Patient, &person("p@example.com", "pw"))?;
        let caregiver =
            workflow::register(conn, PersonType::Caregiver, &person("c@example.com", "pw"))?;

        let request = workflow::initiate_link(conn, patient.person_ref(), "c@example.com")?;
        workflow::assign(conn, caregiver.id, patient.id)?;

        let resolved = workflow::respond_to_link(conn, caregiver.person_ref(), request.id, true)?;
        assert_eq!(resolved.status, RequestStatus::Accepted);

        let caregivers = workflow::list_my_caregivers(conn, patient.id)?;
        assert_eq!(caregivers.len(), 1);
        assert_eq!(caregivers[0].id, caregiver.id);
        Ok(())
    })
    .await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn ledger_keeps_resolved_requests() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.with_conn(|conn| {
        let patient = workflow::register(conn, PersonType::Patient, &person("p@example.com", "pw"))?;
        workflow::register(conn, PersonType::Caregiver, &person("c@example.com", "pw"))?;

        let request = workflow::initiate_link(conn, patient.person_ref(), "c@example.com")?;
        let declined = requests::respond(conn, request.id, false)?;
        assert_eq!(declined.status, RequestStatus::Declined);
        assert!(declined.responded_at.is_some());

        let again = requests::respond(conn, request.id, true);
        assert!(matches!(again, Err(CareError::RequestNotFound)));

        let stored = requests::get(conn, request.id)?.expect("request is kept");
        assert_eq!(stored.status, RequestStatus::Declined);
        assert_eq!(stored.caregiver_email, "c@example.com");
        assert!(workflow::list_notifications(conn, stored.caregiver())?.is_empty());
        Ok(())
    })
    .await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn login_without_role_does_not_fall_through_on_bad_password() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.with_conn(|conn| {
        workflow::register(conn, PersonType::Patient, &person("both@example.com", "patient-pw"))?;
        workflow::register(
            conn,
            PersonType::Caregiver,
            &person("both@example.com", "caregiver-pw"),
        )?;

        let caregiver = workflow::login(conn, None, "both@example.com", "caregiver-pw")?;
        assert_eq!(caregiver.person_type, PersonType::Caregiver);

        let mismatch = workflow::login(conn, None, "both@example.com", "patient-pw");
        assert!(matches!(mismatch, Err(CareError::BadCredential)));

        let patient = workflow::login(
            conn,
            Some(PersonType::Patient),
            "both@example.com",
            "patient-pw",
        )?;
        assert_eq!(patient.person_type, PersonType::Patient);

        assert!(!directory::verify_credential(
            conn,
            PersonType::Patient,
            "nobody@example.com",
            "x"
        )?);
        assert!(directory::verify_credential(
            conn,
            PersonType::Patient,
            " BOTH@example.com ",
            "patient-pw"
        )?);
        Ok(())
    })
    .await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn can_view_patient_follows_links() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    app.with_conn(|conn| {
        let patient = workflow::register(conn, PersonType::Patient, &person("p@example.com", "pw"))?;
        let linked =
            workflow::register(conn, PersonType::Caregiver, &person("c1@example.com", "pw"))?;
        let outsider =
            workflow::register(conn, PersonType::Caregiver, &person("c2@example.com", "pw"))?;
        workflow::assign(conn, linked.id, patient.id)?;

        assert!(workflow::can_view_patient(conn, patient.person_ref(), patient.id)?);
        assert!(workflow::can_view_patient(conn, linked.person_ref(), patient.id)?);
        assert!(!workflow::can_view_patient(conn, outsider.person_ref(), patient.id)?);

        let duplicate = workflow::assign(conn, linked.id, patient.id);
        assert!(matches!(duplicate, Err(CareError::AlreadyLinked)));
        Ok(())
    })
    .await?;

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_registration_reports_duplicate_email() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let pool = app.state.pool.clone();
    let (held, contended) = tokio::task::spawn_blocking(move || {
        contend_with_uncommitted(
            &pool,
            |conn| directory::create(conn, PersonType::Patient, &person("race@example.com", "pw")),
            |conn| directory::create(conn, PersonType::Patient, &person("RACE@example.com", "pw")),
        )
    })
    .await??;

    assert!(held.is_ok());
    assert!(matches!(
        contended,
        Err(CareError::DuplicateEmail(PersonType::Patient))
    ));

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_for_one_pair_report_duplicate_request() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (patient, caregiver) = app
        .with_conn(|conn| {
            let patient =
                workflow::register(conn, PersonType::Patient, &person("p@example.com", "pw"))?;
            let caregiver =
                workflow::register(conn, PersonType::Caregiver, &person("c@example.com", "pw"))?;
            Ok((patient, caregiver))
        })
        .await?;

    let pool = app.state.pool.clone();
    let initiator = patient.person_ref();
    let (held, contended) = tokio::task::spawn_blocking(move || {
        contend_with_uncommitted(
            &pool,
            |conn| requests::create(conn, &patient, &caregiver),
            |conn| workflow::initiate_link(conn, initiator, "c@example.com"),
        )
    })
    .await??;

    let request = held?;
    assert!(matches!(contended, Err(CareError::DuplicateRequest)));

    let pending = app
        .with_conn(move |conn| Ok(requests::list_pending_initiated_by(conn, initiator)?))
        .await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, request.id);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_assignment_reports_already_linked() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (patient_id, caregiver_id) = app
        .with_conn(|conn| {
            let patient =
                workflow::register(conn, PersonType::Patient, &person("p@example.com", "pw"))?;
            let caregiver =
                workflow::register(conn, PersonType::Caregiver, &person("c@example.com", "pw"))?;
            Ok((patient.id, caregiver.id))
        })
        .await?;

    let pool = app.state.pool.clone();
    let (held, contended) = tokio::task::spawn_blocking(move || {
        contend_with_uncommitted(
            &pool,
            |conn| links::create(conn, caregiver_id, patient_id),
            |conn| workflow::assign(conn, caregiver_id, patient_id),
        )
    })
    .await??;

    assert!(held.is_ok());
    assert!(matches!(contended, Err(CareError::AlreadyLinked)));

    let caregivers = app
        .with_conn(move |conn| Ok(workflow::list_my_caregivers(conn, patient_id)?))
        .await?;
    assert_eq!(caregivers.len(), 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn concurrent_accepts_leave_one_link_and_one_winner() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let (patient, caregiver, from_patient, from_caregiver) = app
        .with_conn(|conn| {
            let patient =
                workflow::register(conn, PersonType::Patient, &person("p@example.com", "pw"))?;
            let caregiver =
                workflow::register(conn, PersonType::Caregiver, &person("c@example.com", "pw"))?;
            let from_patient =
                workflow::initiate_link(conn, patient.person_ref(), "c@example.com")?;
            let from_caregiver =
                workflow::initiate_link(conn, caregiver.person_ref(), "p@example.com")?;
            Ok((
                patient.person_ref(),
                caregiver.person_ref(),
                from_patient.id,
                from_caregiver.id,
            ))
        })
        .await?;

    let pool = app.state.pool.clone();
    let outcomes = tokio::task::spawn_blocking(move || -> Result<Vec<CareResult<i32>>> {
        let attempts = [
            (caregiver, from_patient),
            (caregiver, from_patient),
            (patient, from_caregiver),
        ];
        let mut conns = Vec::with_capacity(attempts.len());
        for _ in &attempts {
            conns.push(pool.get()?);
        }
        let barrier = Barrier::new(attempts.len());

        thread::scope(|scope| {
            let handles: Vec<_> = attempts
                .iter()
                .zip(conns.iter_mut())
                .map(|(&(responder, request_id), conn)| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        workflow::respond_to_link(conn, responder, request_id, true)
                            .map(|request| request.id)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| anyhow!("responder thread panicked")))
                .collect()
        })
    })
    .await??;

    let first_pair = &outcomes[..2];
    assert_eq!(first_pair.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert_eq!(
        first_pair
            .iter()
            .filter(|outcome| matches!(outcome, Err(CareError::RequestNotFound)))
            .count(),
        1
    );
    assert!(matches!(outcomes[2], Ok(id) if id == from_caregiver));

    let (linked, caregivers) = app
        .with_conn(move |conn| {
            Ok((
                links::exists(conn, caregiver.id, patient.id)?,
                workflow::list_my_caregivers(conn, patient.id)?,
            ))
        })
        .await?;
    assert!(linked);
    assert_eq!(caregivers.len(), 1);

    app.cleanup().await?;
    Ok(())
}
