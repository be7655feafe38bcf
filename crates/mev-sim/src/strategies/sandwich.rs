//! Sandwich strategy: watch pending swaps, replay them, bracket the large ones.
//!
//! For a watched pending transaction the strategy replays it on a throwaway
//! snapshot, reads the pool `Swap` it would emit and, when the traded leg is
//! above the threshold, builds and signs four legs:
//!
//! 1. front: `exactOutputSingle` buying `notional` of the base token
//! 2. the victim, untouched
//! 3. back: `exactInputSingle` selling the same `notional`
//! 4. bribe: a plain value transfer to the relay's payment address
//!
//! The bundle is optionally simulated in isolation and then handed to the relay.

use alloy::primitives::{address, aliases::U160, Address, Bytes, I256, U256};
use alloy::sol_types::SolCall;
use mev_data::relay::{BundleSubmitter, RelayError, SubmitBundleResult};
use mev_data::store::{DocumentStore, TRANSACTIONS};
use mev_data::types::{BlockHeader, PendingTxDoc, Transaction};
use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, BundleElement, InclusionWindow, SimulationResult};
use crate::decoder::{addresses, decode_swap_log, fee_tier, ISwapRouter, SwapEvent};
use crate::engine::{EngineError, ExecutionEngine, GasPool, LedgerState, Receipt};
use crate::signer::{NonceManager, Signer, SigningError, UnsignedTx};
use crate::simulate::{BundleSimulator, SimError};

/// Router callers watched by default.
pub const DEFAULT_WATCH_LIST: [Address; 20] = [
    address!("Da77c035e4d5A748b4aB6674327Fa446F17098A2"),
    address!("000000000008D5760657dD664c7096897E1AE801"),
    address!("802b65b5d9016621E66003aeD0b16615093f328b"),
    address!("1A0A18AC4BECDDbd6389559687d1A73d8927E416"),
    address!("0000000055ECa968153aeFfa4e421f9cd2680f01"),
    address!("17Cd8E8D4c64aa7f2a8Db6947b330885DA56b833"),
    address!("32564234dF8961ae1d640bE2CBA4aEab54151551"),
    address!("9333C74BDd1E118634fE5664ACA7a9710b108Bab"),
    address!("36EbED00Ae87c55e1036a8af96dd96380958F4C3"),
    address!("773ae23983e1e9720BAfe6E214971Ff762D9758D"),
    address!("0000000040Ac064de24cBC1cB9FCbcbC033eE5B6"),
    address!("5D80acAf6C75F2DEaDf935f21Bd09C9cc4d61d9B"),
    address!("69460570c93f9DE5E2edbC3052bf10125f0Ca22d"),
    address!("3e704f2bC43c6408a5Cf0638a977b82bFB20d748"),
    address!("00000047bB99ea4D791bb749D970DE71EE0b1A34"),
    address!("ce16F69375520ab01377ce7B88f5BA8C48F8D666"),
    address!("0000000256Cdb6d26cF9FD79229976b0fEaECdF4"),
    address!("F552951F9D5f83E2D94D87FcA14545CD33E93d2C"),
    address!("013bb8a204499523ddF717e0aBAA14E6dC849060"),
    address!("e82c715e37f2f2E190dD2cA86Fb796CAFaF0bEFf"),
];

const ONE_ETHER: u64 = 1_000_000_000_000_000_000;
const ONE_GWEI: u128 = 1_000_000_000;

/// Which pool-side amount of the `Swap` event measures the trade.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradedLeg {
    Amount0,
    #[default]
    Amount1,
}

impl TradedLeg {
    pub fn amount(self, swap: &SwapEvent) -> I256 {
        match self {
            Self::Amount0 => swap.amount0,
            Self::Amount1 => swap.amount1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandwichConfig {
    /// Destinations whose pending transactions are considered.
    pub watch_list: Vec<Address>,
    /// Pool whose `Swap` events are measured.
    pub pool: Address,
    pub router: Address,
    /// Token paid in the front leg and received in the back leg.
    pub quote_token: Address,
    /// Token acquired in the front leg and sold in the back leg.
    pub base_token: Address,
    pub fee_tier: u32,
    /// Quantity of the base token bought before and sold after the victim.
    pub notional: U256,
    /// Traded amount the victim must exceed.
    pub threshold: U256,
    pub traded_leg: TradedLeg,
    /// Ceiling on what the front leg may pay for `notional`.
    pub front_max_amount_in: U256,
    pub deadline_secs: u64,
    pub leg_gas_limit: u64,
    pub leg_gas_price: u128,
    pub bribe_recipient: Address,
    pub bribe_value: U256,
    pub bribe_gas_limit: u64,
    pub bribe_gas_price: u128,
    /// Extra heights after the current one the bundle stays valid for.
    pub window_span: u64,
    pub simulate_before_submit: bool,
}

impl Default for SandwichConfig {
    fn default() -> Self {
        Self {
            watch_list: DEFAULT_WATCH_LIST.to_vec(),
            pool: addresses::USDT_WBNB_POOL,
            router: addresses::SMART_ROUTER,
            quote_token: addresses::USDT,
            base_token: addresses::WBNB,
            fee_tier: 500,
            notional: U256::from(ONE_ETHER),
            threshold: U256::from(100u64) * U256::from(ONE_ETHER),
            traded_leg: TradedLeg::Amount1,
            front_max_amount_in: U256::MAX,
            deadline_secs: 3600,
            leg_gas_limit: 300_000,
            leg_gas_price: ONE_GWEI,
            bribe_recipient: addresses::BLOXROUTE_BRIBE,
            bribe_value: U256::from(ONE_ETHER / 1000),
            bribe_gas_limit: 300_000,
            bribe_gas_price: ONE_GWEI,
            window_span: 0,
            simulate_before_submit: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("relay submission failed: {0}")]
    Relay(#[from] RelayError),

    #[error("bundle simulation failed: {0}")]
    Simulation(#[from] SimError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("nonce ordering violated: {0}")]
    Nonce(String),

    #[error("store write failed: {0}")]
    Store(String),
}

/// One transaction of a sandwich with its place in the bundle sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedLeg {
    pub position: u64,
    pub tx: Transaction,
}

/// The four legs of a sandwich in execution order.
///
/// Positions run `n..=n+3`. The strategy's own legs use account nonces
/// `n`, `n+1`, `n+2`; the victim keeps its sender's nonce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SandwichPlan {
    pub notional: U256,
    pub front: PlannedLeg,
    pub victim: PlannedLeg,
    pub back: PlannedLeg,
    pub bribe: PlannedLeg,
}

impl SandwichPlan {
    pub fn legs(&self) -> [&PlannedLeg; 4] {
        [&self.front, &self.victim, &self.back, &self.bribe]
    }

    /// Flat, all-or-nothing bundle of the four legs.
    pub fn to_bundle(&self, window: InclusionWindow) -> Bundle {
        Bundle::new(
            window,
            self.legs()
                .into_iter()
                .map(|leg| BundleElement::tx(leg.tx.clone()))
                .collect(),
        )
    }
}

/// A watched swap large enough to act on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DetectedTrade {
    pub swap: SwapEvent,
    pub traded: I256,
}

#[derive(Clone, Debug)]
pub struct SubmittedBundle {
    pub plan: SandwichPlan,
    pub bundle: Bundle,
    pub simulation: Option<SimulationResult>,
    pub bundle_hash: Option<String>,
}

#[derive(Clone, Debug)]
pub enum PendingOutcome {
    /// Destination not on the watch list.
    Ignored,
    /// Watched but not worth acting on.
    Discarded,
    Submitted(Box<SubmittedBundle>),
}

pub struct SandwichStrategy<E, S, R, D> {
    config: SandwichConfig,
    simulator: BundleSimulator<E>,
    signer: S,
    relay: R,
    store: D,
    nonces: NonceManager,
}

impl<E, S, R, D> SandwichStrategy<E, S, R, D>
where
    E: ExecutionEngine,
    S: Signer,
    R: BundleSubmitter,
    D: DocumentStore,
{
    pub fn new(
        config: SandwichConfig,
        simulator: BundleSimulator<E>,
        signer: S,
        relay: R,
        store: D,
    ) -> Self {
        Self {
            config,
            simulator,
            signer,
            relay,
            store,
            nonces: NonceManager::new(0),
        }
    }

    pub fn config(&self) -> &SandwichConfig {
        &self.config
    }

    pub fn simulator(&self) -> &BundleSimulator<E> {
        &self.simulator
    }

    /// First nonce the next reservation would hand out.
    pub fn next_nonce(&self) -> u64 {
        self.nonces.peek()
    }

    pub fn is_watched(&self, tx: &Transaction) -> bool {
        tx.to
            .is_some_and(|to| self.config.watch_list.contains(&to))
    }

    /// Inclusion window for a bundle built at `height`.
    pub fn window(&self, height: u64) -> InclusionWindow {
        InclusionWindow::new(height, height.saturating_add(self.config.window_span))
    }

    /// Full pipeline for one pending transaction.
    ///
    /// Replay failures count as "not profitable". Errors returned here are
    /// fatal to this opportunity only.
    #[tracing::instrument(skip_all, fields(tx_hash = %tx.hash))]
    pub async fn on_pending_transaction(
        &mut self,
        state: &mut E::State,
        header: &BlockHeader,
        tx: &Transaction,
    ) -> Result<PendingOutcome, StrategyError> {
        if !self.is_watched(tx) {
            return Ok(PendingOutcome::Ignored);
        }

        if let Err(e) = self.record_pending(tx) {
            tracing::warn!(error = %e, "failed to record watched transaction");
        }

        let Some(trade) = self.decide(state, header, tx) else {
            return Ok(PendingOutcome::Discarded);
        };
        tracing::info!(traded = %trade.traded, "swap above threshold");

        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default();
        let plan = self.construct(state, tx, now)?;
        let bundle = plan.to_bundle(self.window(header.number));

        let (simulation, response) = match self.simulate_and_submit(state, header, &bundle).await {
            Ok(done) => done,
            Err(e) => {
                self.nonces.release(plan.front.tx.nonce, 3);
                return Err(e);
            }
        };
        tracing::info!(
            block_number = bundle.inclusion.min_height,
            bundle_hash = response.bundle_hash.as_deref().unwrap_or("-"),
            "sandwich submitted"
        );

        Ok(PendingOutcome::Submitted(Box::new(SubmittedBundle {
            plan,
            bundle,
            simulation,
            bundle_hash: response.bundle_hash,
        })))
    }

    async fn simulate_and_submit(
        &self,
        state: &mut E::State,
        header: &BlockHeader,
        bundle: &Bundle,
    ) -> Result<(Option<SimulationResult>, SubmitBundleResult), StrategyError> {
        let simulation = if self.config.simulate_before_submit {
            let mut gas_pool = GasPool::for_block(header);
            let result =
                self.simulator
                    .simulate_isolated(state, bundle, header, &mut gas_pool, false)?;
            tracing::debug!(
                profit = %result.total_profit,
                gas_used = result.gas_used,
                "sandwich simulated"
            );
            Some(result)
        } else {
            None
        };

        let response = self.relay.submit_bundle(bundle.submission()).await?;
        Ok((simulation, response))
    }

    /// Replays `tx` and returns the watched pool's swap if it clears the threshold.
    pub fn decide(
        &self,
        state: &mut E::State,
        header: &BlockHeader,
        tx: &Transaction,
    ) -> Option<DetectedTrade> {
        let receipt = match self.replay(state, header, tx) {
            Ok(receipt) => receipt,
            Err(e) => {
                tracing::warn!(tx_hash = %tx.hash, error = %e, "replay failed, skipping");
                return None;
            }
        };

        let trade = receipt
            .logs
            .iter()
            .filter(|log| log.address == self.config.pool)
            .filter_map(decode_swap_log)
            .map(|swap| DetectedTrade {
                traded: self.config.traded_leg.amount(&swap),
                swap,
            })
            .find(|trade| self.clears_threshold(trade.traded));

        if trade.is_none() {
            tracing::debug!(tx_hash = %tx.hash, "no swap above threshold");
        }
        trade
    }

    fn clears_threshold(&self, traded: I256) -> bool {
        traded.is_positive() && traded.into_raw() > self.config.threshold
    }

    fn replay(
        &self,
        state: &mut E::State,
        header: &BlockHeader,
        tx: &Transaction,
    ) -> Result<Receipt, EngineError> {
        let snapshot = state.snapshot();
        let mut gas_pool = GasPool::for_block(header);
        let receipt = self
            .simulator
            .engine()
            .apply_transaction(state, header, tx, &mut gas_pool);
        state.revert_to(snapshot)?;
        receipt
    }

    /// Signs the three strategy legs around `victim`.
    ///
    /// Legs start at the account's ledger nonce, so an earlier bundle that
    /// never landed is superseded. Reserved nonces are handed back when
    /// signing fails.
    pub fn construct(
        &mut self,
        state: &E::State,
        victim: &Transaction,
        now: u64,
    ) -> Result<SandwichPlan, StrategyError> {
        let account = self.signer.address();
        if victim.from == account {
            return Err(StrategyError::Nonce(format!(
                "victim {} is sent by the strategy account",
                victim.hash
            )));
        }

        self.nonces.sync(state.nonce(account)?);
        let first = self.nonces.reserve(3);

        match self.sign_legs(victim, first, now) {
            Ok(plan) => Ok(plan),
            Err(e) => {
                self.nonces.release(first, 3);
                Err(e.into())
            }
        }
    }

    fn sign_legs(
        &self,
        victim: &Transaction,
        nonce: u64,
        now: u64,
    ) -> Result<SandwichPlan, SigningError> {
        let config = &self.config;
        let recipient = self.signer.address();
        let deadline = U256::from(now.saturating_add(config.deadline_secs));

        let front_call = ISwapRouter::exactOutputSingleCall {
            params: ISwapRouter::ExactOutputSingleParams {
                tokenIn: config.quote_token,
                tokenOut: config.base_token,
                fee: fee_tier(config.fee_tier),
                recipient,
                deadline,
                amountOut: config.notional,
                amountInMaximum: config.front_max_amount_in,
                sqrtPriceLimitX96: U160::ZERO,
            },
        };
        let back_call = ISwapRouter::exactInputSingleCall {
            params: ISwapRouter::ExactInputSingleParams {
                tokenIn: config.base_token,
                tokenOut: config.quote_token,
                fee: fee_tier(config.fee_tier),
                recipient,
                deadline,
                amountIn: config.notional,
                amountOutMinimum: U256::ZERO,
                sqrtPriceLimitX96: U160::ZERO,
            },
        };

        let front = self.signer.sign(UnsignedTx {
            to: config.router,
            value: U256::ZERO,
            input: Bytes::from(front_call.abi_encode()),
            gas_limit: config.leg_gas_limit,
            gas_price: config.leg_gas_price,
            nonce,
        })?;
        let back = self.signer.sign(UnsignedTx {
            to: config.router,
            value: U256::ZERO,
            input: Bytes::from(back_call.abi_encode()),
            gas_limit: config.leg_gas_limit,
            gas_price: config.leg_gas_price,
            nonce: nonce + 1,
        })?;
        let bribe = self.signer.sign(UnsignedTx {
            to: config.bribe_recipient,
            value: config.bribe_value,
            input: Bytes::new(),
            gas_limit: config.bribe_gas_limit,
            gas_price: config.bribe_gas_price,
            nonce: nonce + 2,
        })?;

        Ok(SandwichPlan {
            notional: config.notional,
            front: PlannedLeg {
                position: nonce,
                tx: front,
            },
            victim: PlannedLeg {
                position: nonce + 1,
                tx: victim.clone(),
            },
            back: PlannedLeg {
                position: nonce + 2,
                tx: back,
            },
            bribe: PlannedLeg {
                position: nonce + 3,
                tx: bribe,
            },
        })
    }

    fn record_pending(&self, tx: &Transaction) -> Result<String, StrategyError> {
        let doc = PendingTxDoc::from_tx(tx, chrono::Utc::now().to_rfc3339());
        self.store
            .put(&doc, TRANSACTIONS)
            .map_err(|e| StrategyError::Store(format!("{e:#}")))
    }
}
