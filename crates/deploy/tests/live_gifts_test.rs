//! Behavioral verification of `LiveGifts.sendGift` on the in-memory network.
//!
//! Run with: cargo test --test live_gifts_test

use alloy_core::primitives::utils::parse_ether;
use alloy_core::primitives::{Address, U256};
use anyhow::Result;
use gantry_deploy::network::memory::LIVE_GIFTS;
use gantry_deploy::{
    BehaviorVerifier, ContractFactory, ContractInstance, ExpectedEvent, FailureReason,
    HarnessError, MemoryNetwork, MethodCall, Network, Signer, Value,
};

const MESSAGE: &str = "Happy birthday!";

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();
}

async fn deploy_live_gifts(network: &MemoryNetwork, deployer: Signer) -> Result<ContractInstance> {
    let factory = ContractFactory::new(network, network.blueprints().get(LIVE_GIFTS)?, deployer);
    let (instance, _) = factory.deploy(vec![]).await?;
    Ok(instance)
}

struct GiftScenario {
    network: MemoryNetwork,
    gifts: ContractInstance,
    sender: Signer,
    receiver: Signer,
    amount: U256,
}

impl GiftScenario {
    /// Deploy a fresh `LiveGifts` with the first signer; the second signer sends
    /// one ether to the third.
    async fn new() -> Result<Self> {
        let network = MemoryNetwork::with_stock_contracts()?;
        let signers = network.signers().await?;
        let gifts = deploy_live_gifts(&network, signers[0]).await?;

        Ok(Self {
            gifts,
            sender: signers[1],
            receiver: signers[2],
            amount: parse_ether("1")?,
            network,
        })
    }

    fn call(&self) -> MethodCall {
        MethodCall::new(
            self.sender,
            "sendGift",
            vec![self.receiver.address.into(), MESSAGE.into()],
        )
        .with_value(self.amount)
    }

    fn expected(&self) -> ExpectedEvent {
        ExpectedEvent::on(&self.gifts, "GiftSent").with_args([
            Value::Address(self.sender.address),
            Value::Address(self.receiver.address),
            Value::Uint(self.amount),
            Value::from(MESSAGE),
        ])
    }

    fn verifier(&self) -> BehaviorVerifier<'_, MemoryNetwork> {
        BehaviorVerifier::new(&self.network)
    }
}

#[tokio::test]
async fn test_send_gift_emits_gift_sent() -> Result<()> {
    init_test_tracing();

    let scenario = GiftScenario::new().await?;
    let before = scenario.network.balance_of(scenario.receiver.address).await;

    let receipt = scenario
        .verifier()
        .verify_event_on_call(&scenario.gifts, scenario.call(), &scenario.expected())
        .await?;

    assert!(receipt.is_success());
    assert_eq!(receipt.events.len(), 1);
    assert_eq!(
        scenario.network.balance_of(scenario.receiver.address).await,
        before + scenario.amount
    );
    assert_eq!(scenario.network.balance_of(scenario.gifts.address).await, U256::ZERO);

    Ok(())
}

#[tokio::test]
async fn test_deployer_sends_a_gift_to_the_second_signer() -> Result<()> {
    init_test_tracing();

    let network = MemoryNetwork::with_stock_contracts()?;
    let signers = network.signers().await?;
    let (sender, receiver) = (signers[0], signers[1]);
    let gifts = deploy_live_gifts(&network, sender).await?;
    let amount = parse_ether("1.0")?;

    let call = MethodCall::new(sender, "sendGift", vec![receiver.address.into(), "A gift!".into()])
        .with_value(amount);
    let expected = ExpectedEvent::on(&gifts, "GiftSent").with_args([
        Value::Address(sender.address),
        Value::Address(receiver.address),
        Value::Uint(amount),
        Value::from("A gift!"),
    ]);

    let receipt = BehaviorVerifier::new(&network)
        .verify_event_on_call(&gifts, call, &expected)
        .await?;
    assert!(receipt.is_success());

    Ok(())
}

#[tokio::test]
async fn test_any_changed_argument_is_a_mismatch() -> Result<()> {
    init_test_tracing();

    let scenario = GiftScenario::new().await?;
    let replacements: [Value; 4] = [
        Address::repeat_byte(0x11).into(),
        scenario.sender.address.into(),
        (scenario.amount + U256::from(1)).into(),
        "Happy birthday".into(),
    ];

    for (i, replacement) in replacements.into_iter().enumerate() {
        let mut expected = scenario.expected();
        expected.args[i] = replacement;

        let result = scenario
            .verifier()
            .verify_event_on_call(&scenario.gifts, scenario.call(), &expected)
            .await;

        match result {
            Err(HarnessError::EventMismatch { expected: e, observed }) => {
                assert_eq!(*e, expected);
                assert_eq!(observed.len(), 1);
                assert_eq!(observed[0].name, "GiftSent");
            }
            other => panic!("argument {i}: expected EventMismatch, got {other:?}"),
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_event_from_another_instance_is_a_mismatch() -> Result<()> {
    init_test_tracing();

    let scenario = GiftScenario::new().await?;
    let other = deploy_live_gifts(&scenario.network, scenario.sender).await?;
    assert_ne!(other.address, scenario.gifts.address);

    let mut expected = scenario.expected();
    expected.emitter = other.address;

    let result = scenario
        .verifier()
        .verify_event_on_call(&scenario.gifts, scenario.call(), &expected)
        .await;
    assert!(matches!(result, Err(HarnessError::EventMismatch { .. })));

    let mut renamed = scenario.expected();
    renamed.name = "GiftReceived".to_string();
    let result = scenario
        .verifier()
        .verify_event_on_call(&scenario.gifts, scenario.call(), &renamed)
        .await;
    assert!(matches!(result, Err(HarnessError::EventMismatch { .. })));

    Ok(())
}

#[tokio::test]
async fn test_zero_value_gift_reverts() -> Result<()> {
    init_test_tracing();

    let scenario = GiftScenario::new().await?;
    let call = scenario.call().with_value(U256::ZERO);

    let result = scenario
        .verifier()
        .verify_event_on_call(&scenario.gifts, call, &scenario.expected())
        .await;

    match result {
        Err(HarnessError::CallReverted {
            contract,
            method,
            reason: FailureReason::Reverted(reason),
        }) => {
            assert_eq!(contract, scenario.gifts.address);
            assert_eq!(method, "sendGift");
            assert_eq!(reason, "gift value required");
        }
        other => panic!("expected CallReverted, got {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn test_zero_receiver_reverts_and_keeps_funds() -> Result<()> {
    init_test_tracing();

    let scenario = GiftScenario::new().await?;
    let before = scenario.network.balance_of(scenario.sender.address).await;
    let call = MethodCall::new(
        scenario.sender,
        "sendGift",
        vec![Address::ZERO.into(), MESSAGE.into()],
    )
    .with_value(scenario.amount);

    let result = scenario
        .verifier()
        .verify_event_on_call(&scenario.gifts, call, &scenario.expected())
        .await;

    assert!(matches!(
        result,
        Err(HarnessError::CallReverted {
            reason: FailureReason::Reverted(_),
            ..
        })
    ));
    assert_eq!(scenario.network.balance_of(scenario.sender.address).await, before);

    Ok(())
}

#[tokio::test]
async fn test_unreachable_network_is_a_failed_call() -> Result<()> {
    init_test_tracing();

    let scenario = GiftScenario::new().await?;
    scenario.network.set_reachable(false);

    let result = scenario
        .verifier()
        .verify_event_on_call(&scenario.gifts, scenario.call(), &scenario.expected())
        .await;

    assert!(matches!(
        result,
        Err(HarnessError::CallReverted {
            reason: FailureReason::Unreachable(_),
            ..
        })
    ));

    Ok(())
}

#[tokio::test]
async fn test_ill_typed_call_is_rejected_before_submission() -> Result<()> {
    init_test_tracing();

    let scenario = GiftScenario::new().await?;
    let blocks = scenario.network.block_number().await;
    let call = MethodCall::new(scenario.sender, "sendGift", vec![MESSAGE.into()]);

    let result = scenario
        .verifier()
        .verify_event_on_call(&scenario.gifts, call, &scenario.expected())
        .await;

    assert!(matches!(result, Err(HarnessError::InvalidArguments { .. })));
    assert_eq!(scenario.network.block_number().await, blocks);

    Ok(())
}
