//! Integration tests for admission gating, FIFO ordering, cancellation
//! safety, and the event stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use wired_governor::{
    CappedSumPolicy, Coordinator, FixedMarginPolicy, GovernorConfig, GovernorEvent, PlatformError,
    SumDemandPolicy, TicketKind, TicketState, WiredPlatform,
};

/// Platform with full wired-limit support and a fixed recommendation.
struct StubPlatform {
    recommended: u64,
}

impl WiredPlatform for StubPlatform {
    fn supports_wired_limit(&self) -> bool {
        true
    }

    fn recommended_working_set(&self) -> Option<u64> {
        Some(self.recommended)
    }

    fn set_wired_limit(&self, bytes: u64) -> Result<u64, PlatformError> {
        Ok(bytes)
    }
}

fn coordinator(recommended: u64) -> Coordinator {
    let config = GovernorConfig {
        shrink_cooldown_ms: 0,
        ..GovernorConfig::default()
    };
    Coordinator::new(Arc::new(StubPlatform { recommended }), config).expect("valid config")
}

/// Poll `cond` until it holds, panicking after one second.
async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn test_fifo_order_holds_even_when_a_later_ticket_would_fit() {
    let coordinator = coordinator(0);
    let policy = Arc::new(CappedSumPolicy::new("inference", 100));

    let first = coordinator.ticket(policy.clone(), 80, TicketKind::Active);
    first.start().await;
    assert_eq!(first.state(), TicketState::Running);

    // Second does not fit (80 + 50 > 100) and parks at the queue head.
    let second = coordinator.ticket(policy.clone(), 50, TicketKind::Active);
    let second_task = tokio::spawn({
        let second = second.clone();
        async move { second.start().await }
    });
    wait_until("second ticket queued", || {
        coordinator.stats().waiting_tickets == 1
    })
    .await;

    // Third would fit (80 + 10 <= 100) but must not jump the queue.
    let third = coordinator.ticket(policy, 10, TicketKind::Active);
    let third_task = tokio::spawn({
        let third = third.clone();
        async move { third.start().await }
    });
    wait_until("third ticket queued", || {
        coordinator.stats().waiting_tickets == 2
    })
    .await;

    sleep(Duration::from_millis(50)).await;
    assert_eq!(
        third.state(),
        TicketState::Admitted,
        "later arrival must stay behind the denied head"
    );

    #[cfg(feature = "events")]
    let mut events = coordinator.events();

    // Releasing the first frees capacity for both waiters, in order.
    first.release();
    second_task.await.expect("second start");
    third_task.await.expect("third start");
    assert_eq!(second.state(), TicketState::Running);
    assert_eq!(third.state(), TicketState::Running);
    assert_eq!(coordinator.stats().waiting_tickets, 0);

    // Admission events come out in FIFO order.
    #[cfg(feature = "events")]
    {
        let mut admitted = Vec::new();
        while admitted.len() < 2 {
            match events.recv().await {
                Some(GovernorEvent::TicketAdmitted { ticket, .. }) => admitted.push(ticket),
                Some(_) => {}
                None => panic!("event stream ended early"),
            }
        }
        assert_eq!(admitted, vec![second.id(), third.id()]);
    }

    second.release();
    third.release();
}

#[tokio::test]
async fn test_cancelled_start_leaves_no_trace() {
    let coordinator = coordinator(0);
    let policy = Arc::new(CappedSumPolicy::new("inference", 100));

    let holder = coordinator.ticket(policy.clone(), 100, TicketKind::Active);
    holder.start().await;

    let waiter = coordinator.ticket(policy, 60, TicketKind::Active);
    let task = tokio::spawn({
        let waiter = waiter.clone();
        async move { waiter.start().await }
    });
    wait_until("waiter queued", || coordinator.stats().waiting_tickets == 1).await;

    task.abort();
    let joined = task.await;
    assert!(joined.unwrap_err().is_cancelled());

    wait_until("waiter cleaned up", || waiter.state() == TicketState::Released).await;
    let stats = coordinator.stats();
    assert_eq!(stats.waiting_tickets, 0);
    assert_eq!(stats.ticket_count, 1, "only the holder remains");

    holder.release();
    assert_eq!(coordinator.stats().ticket_count, 0);
    assert_eq!(coordinator.stats().applied_limit, 0);
}

#[tokio::test]
async fn test_concurrent_starts_on_one_ticket_both_resume() {
    let coordinator = coordinator(0);
    let policy = Arc::new(CappedSumPolicy::new("inference", 100));

    let holder = coordinator.ticket(policy.clone(), 100, TicketKind::Active);
    holder.start().await;

    // Two callers start the same denied ticket through clones; the queue
    // holds a single entry for it.
    let waiter = coordinator.ticket(policy, 60, TicketKind::Active);
    let first_caller = tokio::spawn({
        let waiter = waiter.clone();
        async move { waiter.start().await }
    });
    wait_until("waiter queued", || coordinator.stats().waiting_tickets == 1).await;

    let second_caller = tokio::spawn({
        let waiter = waiter.clone();
        async move { waiter.start().await }
    });
    sleep(Duration::from_millis(50)).await;
    assert_eq!(coordinator.stats().waiting_tickets, 1);

    // Admission must resume both suspended callers, not just one.
    holder.release();
    timeout(Duration::from_secs(1), first_caller)
        .await
        .expect("first caller resumes after admission")
        .expect("first start");
    timeout(Duration::from_secs(1), second_caller)
        .await
        .expect("second caller resumes after admission")
        .expect("second start");
    assert_eq!(waiter.state(), TicketState::Running);
    assert_eq!(coordinator.stats().waiting_tickets, 0);

    waiter.release();
}

#[tokio::test]
async fn test_with_wired_limit_releases_on_normal_return() {
    let coordinator = coordinator(0);
    let policy = Arc::new(SumDemandPolicy::new("inference"));
    let ticket = coordinator.ticket(policy, 100, TicketKind::Active);

    let coordinator_in_body = coordinator.clone();
    let value = ticket
        .with_wired_limit(|| async move {
            assert_eq!(coordinator_in_body.stats().applied_limit, 100);
            42
        })
        .await;

    assert_eq!(value, 42);
    assert_eq!(ticket.state(), TicketState::Released);
    assert_eq!(coordinator.stats().applied_limit, 0);
}

#[tokio::test]
async fn test_with_wired_limit_releases_on_panic() {
    let coordinator = coordinator(0);
    let policy = Arc::new(SumDemandPolicy::new("inference"));
    let ticket = coordinator.ticket(policy, 100, TicketKind::Active);

    let task = tokio::spawn({
        let ticket = ticket.clone();
        async move {
            ticket
                .with_wired_limit(|| async {
                    panic!("body failed");
                })
                .await
        }
    });
    assert!(task.await.unwrap_err().is_panic());

    assert_eq!(ticket.state(), TicketState::Released);
    assert_eq!(coordinator.stats().ticket_count, 0);
}

#[tokio::test]
async fn test_with_wired_limit_releases_on_cancellation() {
    let coordinator = coordinator(0);
    let policy = Arc::new(SumDemandPolicy::new("inference"));
    let ticket = coordinator.ticket(policy, 100, TicketKind::Active);

    let scoped = ticket.with_wired_limit(|| async {
        sleep(Duration::from_secs(60)).await;
    });
    assert!(timeout(Duration::from_millis(20), scoped).await.is_err());

    assert_eq!(ticket.state(), TicketState::Released);
    assert_eq!(coordinator.stats().applied_limit, 0);
}

#[tokio::test]
async fn test_start_after_release_is_a_no_op() {
    let coordinator = coordinator(0);
    let policy = Arc::new(SumDemandPolicy::new("inference"));
    let ticket = coordinator.ticket(policy, 100, TicketKind::Active);

    ticket.release();
    assert_eq!(ticket.state(), TicketState::Released);

    // Terminal state: starting must return immediately without registering.
    ticket.start().await;
    assert_eq!(ticket.state(), TicketState::Released);
    assert_eq!(coordinator.stats().ticket_count, 0);
}

#[tokio::test]
async fn test_named_and_derived_grouping() {
    let coordinator = coordinator(1_000);

    // Independently constructed policies with the same name share a group.
    let sum_a = Arc::new(SumDemandPolicy::new("weights"));
    let sum_b = Arc::new(SumDemandPolicy::new("weights"));
    let first = coordinator.ticket(sum_a, 400, TicketKind::Active);
    let second = coordinator.ticket(sum_b, 200, TicketKind::Active);
    first.start().await;
    second.start().await;
    assert_eq!(coordinator.stats().group_count, 1);
    assert_eq!(coordinator.stats().applied_limit, 1_600);

    // Equal-valued hashable policies collapse structurally: two running
    // margin tickets hold one margin, not two.
    let margin_a = Arc::new(FixedMarginPolicy::new(100));
    let margin_b = Arc::new(FixedMarginPolicy::new(100));
    let third = coordinator.ticket(margin_a, 1, TicketKind::Active);
    let fourth = coordinator.ticket(margin_b, 1, TicketKind::Active);
    third.start().await;
    fourth.start().await;
    assert_eq!(coordinator.stats().group_count, 2);

    // Final limit is the max over group candidates: sum group proposes
    // 1600, margin group proposes 1100.
    assert_eq!(coordinator.stats().applied_limit, 1_600);

    first.release();
    second.release();
    assert_eq!(coordinator.stats().applied_limit, 1_100);

    third.release();
    fourth.release();
    assert_eq!(coordinator.stats().group_count, 0);
    assert_eq!(coordinator.stats().applied_limit, 1_000);
}

#[cfg(feature = "events")]
#[tokio::test]
async fn test_event_stream_mirrors_decision_order() {
    let coordinator = coordinator(0);
    let policy = Arc::new(SumDemandPolicy::new("inference"));
    let mut events = coordinator.events();

    let ticket = coordinator.ticket(policy, 100, TicketKind::Active);
    ticket.start().await;
    ticket.release();

    assert!(matches!(
        events.recv().await,
        Some(GovernorEvent::TicketAdmitted { ticket: id, size: 100, .. }) if id == ticket.id()
    ));
    assert_eq!(
        events.recv().await,
        Some(GovernorEvent::LimitApplied {
            previous: 0,
            applied: 100
        })
    );
    assert!(matches!(
        events.recv().await,
        Some(GovernorEvent::TicketReleased { ticket: id, .. }) if id == ticket.id()
    ));
    assert_eq!(
        events.recv().await,
        Some(GovernorEvent::LimitApplied {
            previous: 100,
            applied: 0
        })
    );
}
