mod common;

use common::TestBank;
use ledgerguard::config::{BucketPolicy, Config};
use ledgerguard::domain::account::Balance;
use ledgerguard::domain::audit::{ActionKind, Outcome};
use ledgerguard::domain::request::RequestContext;
use ledgerguard::error::LedgerError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// Admission out of the way: these tests are about the ledger.
fn unthrottled() -> Config {
    let mut config = Config::default();
    config.rate_limit.transaction = BucketPolicy::new(100_000, 60);
    config.ledger.max_commit_retries = 10_000;
    config
}

fn ctx(n: usize) -> RequestContext {
    RequestContext::from_remote(format!("10.0.{}.{}", n / 250, n % 250))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_of_full_balance_admit_one() {
    for _ in 0..20 {
        let bank = Arc::new(TestBank::new(unthrottled()));
        bank.seed("A", 1, "alice", dec!(100.00)).await;

        let first = {
            let bank = Arc::clone(&bank);
            tokio::spawn(async move { bank.bank.withdraw(&ctx(1), &"A".into(), dec!(100.00)).await })
        };
        let second = {
            let bank = Arc::clone(&bank);
            tokio::spawn(async move { bank.bank.withdraw(&ctx(2), &"A".into(), dec!(100.00)).await })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. })))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(insufficient, 1);
        assert_eq!(bank.account("A").await.balance, Balance::ZERO);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deposits_lose_no_update() {
    let bank = Arc::new(TestBank::new(unthrottled()));
    bank.seed("A", 1, "alice", dec!(0)).await;

    let handles: Vec<_> = (0..200)
        .map(|i| {
            let bank = Arc::clone(&bank);
            tokio::spawn(async move { bank.bank.deposit(&ctx(i), &"A".into(), dec!(1.25)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(bank.account("A").await.balance, Balance::new(dec!(250.00)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_conserve_total() {
    let bank = Arc::new(TestBank::new(unthrottled()));
    let ids = ["A", "B", "C", "D"];
    for (n, id) in ids.iter().enumerate() {
        bank.seed(id, n as u64 + 1, &format!("user{}", n), dec!(100.00)).await;
    }

    let handles: Vec<_> = (0..400)
        .map(|i| {
            let bank = Arc::clone(&bank);
            let from = ids[i % 4];
            let to = ids[(i * 7 + 1) % 4];
            let amount = Decimal::new((i as i64 % 50) + 1, 0);
            tokio::spawn(async move {
                bank.bank
                    .transfer(&ctx(i), &from.into(), &to.into(), amount)
                    .await
            })
        })
        .collect();

    for handle in handles {
        match handle.await.unwrap() {
            Ok(_)
            | Err(LedgerError::InsufficientFunds { .. })
            | Err(LedgerError::Validation(_)) => {}
            Err(e) => panic!("unexpected transfer error: {}", e),
        }
    }

    let mut total = Balance::ZERO;
    for id in ids {
        let balance = bank.account(id).await.balance;
        assert!(balance >= Balance::ZERO);
        total += balance;
    }
    assert_eq!(total, Balance::new(dec!(400.00)));
}

#[tokio::test]
async fn test_balance_is_sum_of_applied_amounts() {
    let bank = TestBank::new(unthrottled());
    bank.seed("A", 1, "alice", dec!(0)).await;
    let ctx = RequestContext::from_remote("10.0.0.1");

    bank.bank.deposit(&ctx, &"A".into(), dec!(30.10)).await.unwrap();
    bank.bank.deposit(&ctx, &"A".into(), dec!(0.01)).await.unwrap();
    bank.bank.withdraw(&ctx, &"A".into(), dec!(15.05)).await.unwrap();
    assert!(bank.bank.withdraw(&ctx, &"A".into(), dec!(15.07)).await.is_err());
    assert!(bank.bank.deposit(&ctx, &"A".into(), dec!(0.001)).await.is_err());

    assert_eq!(bank.account("A").await.balance, Balance::new(dec!(15.06)));

    let records = bank.finish().await;
    let successes = records
        .iter()
        .filter(|r| r.event.outcome == Outcome::Success)
        .count();
    assert_eq!(successes, 3);
    let rejected = records
        .iter()
        .filter(|r| r.event.action == ActionKind::Withdrawal && r.event.outcome == Outcome::Failure)
        .count();
    assert_eq!(rejected, 1);
}
