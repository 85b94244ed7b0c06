//! End-to-end checks of the award coordinator: one accepted bid per
//! tender, full rollback on mid-transaction failure, and the fate of
//! withdrawn siblings.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use tenderd_core::audit::AuditAction;
use tenderd_core::domain::actor::{Actor, UserId};
use tenderd_core::domain::bid::{Bid, BidStatus, NewBid};
use tenderd_core::domain::tender::{NewTender, Tender, TenderStatus};
use tenderd_core::errors::DomainError;
use tenderd_core::notify::InMemoryNotifier;
use tenderd_db::connection::{ConnectionManager, ConnectionSettings};
use tenderd_db::migrations;
use tenderd_engine::{EngineError, LifecycleService};

async fn setup() -> (ConnectionManager, LifecycleService) {
    let manager = ConnectionManager::connect("sqlite::memory:", ConnectionSettings::default())
        .await
        .expect("connect");
    migrations::run_pending(&manager.pool().expect("pool")).await.expect("migrations");
    let service = LifecycleService::new(manager.clone(), Arc::new(InMemoryNotifier::default()));
    (manager, service)
}

async fn open_tender(service: &LifecycleService, owner: i64) -> Tender {
    service
        .create_tender(NewTender {
            title: "Fleet maintenance".to_string(),
            description: "Annual service contract for thirty vehicles".to_string(),
            category_id: None,
            budget_min: None,
            budget_max: Some(Decimal::new(12_000_000, 2)),
            deadline: Utc::now() + Duration::days(7),
            created_by: UserId(owner),
            requirements: None,
            publish: true,
        })
        .await
        .expect("create tender")
}

async fn submit(service: &LifecycleService, tender: &Tender, vendor: i64, cents: i64) -> Bid {
    service
        .submit_bid(NewBid {
            tender_id: tender.id,
            vendor_id: UserId(vendor),
            amount: Decimal::new(cents, 2),
            proposal: format!("Offer from vendor {vendor}"),
            delivery_timeline: None,
            attachments: Vec::new(),
        })
        .await
        .expect("submit bid")
}

#[tokio::test]
async fn award_from_open_settles_the_whole_tender() {
    let (_manager, service) = setup().await;
    let buyer = Actor::buyer(1);
    let tender = open_tender(&service, 1).await;
    let first = submit(&service, &tender, 10, 10_000_00).await;
    let second = submit(&service, &tender, 11, 9_000_00).await;

    let accepted = service.award_bid(second.id, &buyer).await.expect("award");
    assert_eq!(accepted.id, second.id);
    assert_eq!(accepted.status, BidStatus::Accepted);
    assert_eq!(accepted.evaluated_by, Some(UserId(1)));

    let loser = service.bid(first.id).await.expect("loser");
    assert_eq!(loser.status, BidStatus::Rejected);
    assert!(loser.rejection_reason.is_some());

    let settled = service.tender(tender.id).await.expect("tender");
    assert_eq!(settled.status, TenderStatus::Awarded);
    assert!(settled.closing_date.is_some());

    let winner_trail = service.history_for_bid(second.id).await.expect("history");
    assert_eq!(
        winner_trail.last().map(|record| record.action),
        Some(AuditAction::Accepted)
    );
    let loser_trail = service.history_for_bid(first.id).await.expect("history");
    assert_eq!(
        loser_trail.last().map(|record| record.action),
        Some(AuditAction::Rejected)
    );
}

#[tokio::test]
async fn at_most_one_bid_is_ever_accepted() {
    let (manager, service) = setup().await;
    let buyer = Actor::buyer(1);
    let tender = open_tender(&service, 1).await;
    let first = submit(&service, &tender, 10, 10_000_00).await;
    let second = submit(&service, &tender, 11, 9_000_00).await;

    service.award_bid(second.id, &buyer).await.expect("first award");

    // Re-awarding the winner and awarding the loser both fail terminally.
    for target in [second.id, first.id] {
        let error = service.award_bid(target, &buyer).await.expect_err("terminal bid");
        assert_eq!(error.code(), "already_processed");
    }

    let pool = manager.pool().expect("pool");
    let accepted: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM bid WHERE tender_id = ? AND status = 'accepted'",
    )
    .bind(tender.id.0)
    .fetch_one(&pool)
    .await
    .expect("count");
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn withdrawn_bids_are_not_swept_into_rejection() {
    let (_manager, service) = setup().await;
    let buyer = Actor::buyer(1);
    let tender = open_tender(&service, 1).await;
    let withdrawn = submit(&service, &tender, 10, 10_000_00).await;
    let winner = submit(&service, &tender, 11, 9_000_00).await;

    service
        .withdraw_bid(withdrawn.id, &Actor::vendor(10), Some("capacity".to_string()))
        .await
        .expect("withdraw");
    service.award_bid(winner.id, &buyer).await.expect("award");

    let untouched = service.bid(withdrawn.id).await.expect("withdrawn bid");
    assert_eq!(untouched.status, BidStatus::Withdrawn);
    assert!(untouched.evaluated_by.is_none());
}

#[tokio::test]
async fn failed_award_rolls_back_every_row() {
    let (manager, service) = setup().await;
    let buyer = Actor::buyer(1);
    let tender = open_tender(&service, 1).await;
    submit(&service, &tender, 10, 10_000_00).await;
    let second = submit(&service, &tender, 11, 9_000_00).await;

    // Sabotage the journal so the award fails after the accept statement.
    let pool = manager.pool().expect("pool");
    sqlx::query("DROP TABLE bid_history").execute(&pool).await.expect("drop");

    let error = service.award_bid(second.id, &buyer).await.expect_err("award must fail");
    assert_eq!(error.code(), "transaction_failed");

    // Nothing moved: both bids still pending, tender still open.
    let statuses: Vec<String> =
        sqlx::query_scalar("SELECT status FROM bid WHERE tender_id = ? ORDER BY id")
            .bind(tender.id.0)
            .fetch_all(&pool)
            .await
            .expect("statuses");
    assert_eq!(statuses, vec!["pending".to_string(), "pending".to_string()]);

    let tender_status: String = sqlx::query_scalar("SELECT status FROM tender WHERE id = ?")
        .bind(tender.id.0)
        .fetch_one(&pool)
        .await
        .expect("tender status");
    assert_eq!(tender_status, "open");
}

#[tokio::test]
async fn only_the_owner_or_an_admin_can_award() {
    let (_manager, service) = setup().await;
    let tender = open_tender(&service, 1).await;
    let bid = submit(&service, &tender, 10, 10_000_00).await;

    let error = service
        .award_bid(bid.id, &Actor::buyer(99))
        .await
        .expect_err("stranger cannot award");
    assert!(matches!(error, EngineError::Domain(DomainError::Forbidden { .. })));

    let unchanged = service.bid(bid.id).await.expect("bid");
    assert_eq!(unchanged.status, BidStatus::Pending);

    service.award_bid(bid.id, &Actor::admin(50)).await.expect("admin award");
}

#[tokio::test]
async fn cancelled_tender_cannot_be_awarded() {
    let (_manager, service) = setup().await;
    let owner = Actor::buyer(1);
    let tender = open_tender(&service, 1).await;
    let bid = submit(&service, &tender, 10, 10_000_00).await;

    service.cancel_tender(tender.id, &owner).await.expect("cancel");

    let error = service.award_bid(bid.id, &owner).await.expect_err("no award after cancel");
    assert_eq!(error.code(), "invalid_transition");

    let unchanged = service.bid(bid.id).await.expect("bid");
    assert_eq!(unchanged.status, BidStatus::Pending);
}
