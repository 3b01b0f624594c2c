use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use spotbook::clock::now_ms;
use spotbook::engine::{BookingRequest, Engine, EngineError};
use spotbook::limits::{HOUR_MS, MINUTE_MS};
use spotbook::model::*;
use spotbook::notify::NotifyHub;
use spotbook::repo::RepoError;
use spotbook::store::Store;

const GUILD: GuildId = 1;

// ── Test infrastructure ──────────────────────────────────────

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("spotbook_int_test_{}_{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn start(dir: &PathBuf) -> (Engine, Arc<Store>, Arc<NotifyHub>) {
    let store = Arc::new(Store::open(&dir.join("spotbook.wal")).unwrap());
    for name in ["Library", "Prison -1", "Prison -2"] {
        store.ensure_spot(name).await.unwrap();
    }
    let hub = Arc::new(NotifyHub::new());
    let engine = Engine::new(store.clone(), store.clone(), hub.clone());
    (engine, store, hub)
}

/// Top of the next hour, a day from now.
fn tomorrow() -> Ms {
    let t = now_ms() + 24 * HOUR_MS;
    t - t % HOUR_MS
}

fn request(member: &Member, spot_name: &str, start: Ms, end: Ms) -> BookingRequest {
    BookingRequest {
        member: member.clone(),
        guild_id: GUILD,
        spot_name: spot_name.into(),
        start_at: start,
        end_at: end,
        overbook: false,
        elevated: false,
    }
}

async fn wait_for<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_never_overlap() {
    let dir = test_dir("concurrent");
    let (engine, _store, _hub) = start(&dir).await;
    let t = tomorrow();

    let mut handles = Vec::new();
    for id in 1..=8u64 {
        let engine = engine.clone();
        let member = Member::new(id, format!("member-{id}"));
        handles.push(tokio::spawn(async move {
            engine
                .book(request(&member, "Library", t + 10 * MINUTE_MS * id as Ms, t + 2 * HOUR_MS))
                .await
        }));
    }

    let mut booked = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => booked += 1,
            Err(EngineError::InsufficientPermissions { .. }) => {}
            Err(EngineError::Repository {
                source: RepoError::Overlap(_),
                ..
            }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(booked, 1);

    let schedule = engine.guild_schedule(GUILD).await.unwrap();
    assert_eq!(schedule.len(), 1);
    assert_eq!(schedule[0].reservations.len(), 1);
}

#[tokio::test]
async fn overbooked_member_receives_notice() {
    let dir = test_dir("notice");
    let (engine, _store, hub) = start(&dir).await;
    let t = tomorrow();
    let alice = Member::new(1, "alice");
    let bob = Member::new(2, "bob");
    let mut inbox = hub.subscribe(bob.id);

    engine
        .book(request(&bob, "Prison -1", t, t + 2 * HOUR_MS))
        .await
        .unwrap();
    let clipped = engine
        .book(BookingRequest {
            overbook: true,
            elevated: true,
            ..request(&alice, "Prison -1", t, t + HOUR_MS)
        })
        .await
        .unwrap();
    assert_eq!(clipped.len(), 1);

    let payload = tokio::time::timeout(Duration::from_secs(5), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
    assert_eq!(json["recipient"], 2);
    assert_eq!(json["detail"]["leftovers"].as_array().unwrap().len(), 1);
    assert_eq!(
        json["detail"]["leftovers"][0]["start_at"],
        t + HOUR_MS + MINUTE_MS
    );
}

#[tokio::test]
async fn adjacent_own_bookings_merge_in_background() {
    let dir = test_dir("merge");
    let (engine, _store, _hub) = start(&dir).await;
    let t = tomorrow();
    let alice = Member::new(1, "alice");

    engine
        .book(request(&alice, "Library", t, t + HOUR_MS))
        .await
        .unwrap();
    engine
        .book(request(&alice, "Library", t + HOUR_MS, t + 2 * HOUR_MS))
        .await
        .unwrap();

    wait_for(|| {
        let engine = engine.clone();
        async move { engine.member_reservations(GUILD, 1).await.unwrap().len() == 1 }
    })
    .await;
    let mine = engine.member_reservations(GUILD, 1).await.unwrap();
    assert_eq!(mine[0].span(), Span::new(t, t + 2 * HOUR_MS));
}

#[tokio::test]
async fn reservations_survive_restart() {
    let dir = test_dir("restart");
    let t = tomorrow();
    let alice = Member::new(1, "alice");
    let id = {
        let (engine, store, _hub) = start(&dir).await;
        engine
            .book(request(&alice, "Prison -2", t, t + HOUR_MS))
            .await
            .unwrap();
        engine
            .book(request(&alice, "Library", t + 2 * HOUR_MS, t + 3 * HOUR_MS))
            .await
            .unwrap();
        store.compact().await.unwrap();
        engine.member_reservations(GUILD, 1).await.unwrap()[0]
            .reservation
            .id
    };

    let (engine, store, _hub) = start(&dir).await;
    assert_eq!(store.reservation_count(), 2);
    assert_eq!(engine.spots(None).await.unwrap().len(), 3);

    let removed = engine.unbook(GUILD, &alice, id).await.unwrap();
    assert_eq!(removed.spot.name, "Prison -2");

    // A fresh booking never reuses an id from before the restart.
    engine
        .book(request(&alice, "Prison -1", t + 4 * HOUR_MS, t + 5 * HOUR_MS))
        .await
        .unwrap();
    let ids: Vec<ReservationId> = engine
        .member_reservations(GUILD, 1)
        .await
        .unwrap()
        .iter()
        .map(|r| r.reservation.id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&id));
    assert!(ids.iter().all(|i| *i > id));
}
