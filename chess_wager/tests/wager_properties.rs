/// Property-based tests for wager bounds and commission arithmetic
///
/// These tests verify that out-of-range wagers never reach the escrow
/// contract and that every funded receipt carries exactly the attached
/// value across a wide range of amounts.
mod common;

use chess_wager::{
    GameId, SessionConfig, Wei,
    escrow::{EscrowClient, commission_for},
    session::{PreconditionError, SessionError},
};
use common::{Harness, MockEscrow, intent, wallet};
use proptest::prelude::*;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// Strategy for wagers outside (0, max]
fn out_of_range_wager() -> impl Strategy<Value = Wei> {
    let max = SessionConfig::default().max_wager.0;
    prop_oneof![Just(Wei::ZERO), (max + 1..=u128::MAX).prop_map(Wei),]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_out_of_range_wager_never_reaches_escrow(wager in out_of_range_wager()) {
        let (result, calls, sent) = runtime().block_on(async {
            let harness = Harness::start(MockEscrow::new()).await;
            let result = harness.handle.submit(intent(wager)).await;
            (result, harness.escrow.calls(), harness.channel.sent())
        });

        let is_invalid_wager = matches!(
            result,
            Err(SessionError::Precondition(PreconditionError::InvalidWager { .. }))
        );
        prop_assert!(is_invalid_wager);
        prop_assert!(calls.is_empty());
        prop_assert!(sent.is_empty());
    }

    #[test]
    fn test_commission_is_floor_of_percentage(wager in 1u128..=u128::MAX / 1_000, pct in 0u32..=100) {
        let commission = commission_for(Wei(wager), pct).0;
        let scaled = wager * u128::from(pct);
        prop_assert!(commission * 100 <= scaled);
        prop_assert!(scaled < (commission + 1) * 100);
    }

    #[test]
    fn test_receipt_value_matches_attached_value(wager in 1u128..=1_000_000_000_000_000_000_000u128) {
        let (receipt, calls) = runtime().block_on(async {
            let escrow = Arc::new(MockEscrow::new());
            let client = EscrowClient::new(escrow.clone(), 5, 21_000);
            let quote = client.estimate_gas_price().await.unwrap();
            let receipt = client
                .fund_game(
                    &GameId::new("game-prop").unwrap(),
                    Wei(wager),
                    &wallet(Wei(u128::MAX)),
                    Some(&quote),
                )
                .await
                .unwrap();
            (receipt, escrow.calls())
        });

        prop_assert_eq!(calls.len(), 1);
        prop_assert_eq!(receipt.commission, commission_for(Wei(wager), 5));
        prop_assert_eq!(
            calls[0].clone(),
            common::EscrowCall::Create {
                game_id: "game-prop".to_string(),
                wager: Wei(wager),
                value: receipt.attached_value(),
            }
        );
    }
}
