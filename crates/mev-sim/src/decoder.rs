//! Concentrated-liquidity pool and router ABI, compiled with `alloy::sol!`.
//!
//! Covers the pool `Swap` event consumed by telemetry and the decision step,
//! and the router single-hop swaps used to build the front and back legs.

use alloy::primitives::{aliases::U24, Address, I256, U256};
use alloy::sol;
use alloy::sol_types::SolEvent;
use mev_data::types::LogRecord;

/// BSC mainnet contract addresses used as configuration defaults.
pub mod addresses {
    use alloy::primitives::{address, Address};

    /// PancakeSwap v3 smart router.
    pub const SMART_ROUTER: Address = address!("1b81D678ffb9C0263b24A97847620C99d213eB14");

    /// USDT/WBNB 0.05% pool.
    pub const USDT_WBNB_POOL: Address = address!("36696169C63e42cd08ce11f5deeBbCeBae652050");

    /// Binance-Peg USDT.
    pub const USDT: Address = address!("55d398326f99059fF775485246999027B3197955");

    /// Wrapped BNB.
    pub const WBNB: Address = address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c");

    /// Relay address that receives inclusion payments.
    pub const BLOXROUTE_BRIBE: Address = address!("74c5F8C6ffe41AD4789602BDB9a48E6Cad623520");
}

sol! {
    /// Emitted by the pool on every swap. Amounts are signed pool-side deltas.
    #[derive(Debug)]
    event Swap(
        address indexed sender,
        address indexed recipient,
        int256 amount0,
        int256 amount1,
        uint160 sqrtPriceX96,
        uint128 liquidity,
        int24 tick,
        uint128 protocolFeesToken0,
        uint128 protocolFeesToken1
    );
}

sol! {
    interface ISwapRouter {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        struct ExactOutputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountOut;
            uint256 amountInMaximum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256 amountOut);

        function exactOutputSingle(ExactOutputSingleParams calldata params) external payable returns (uint256 amountIn);
    }
}

/// Decoded pool swap with plain integer types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapEvent {
    pub pool: Address,
    pub sender: Address,
    pub recipient: Address,
    pub amount0: I256,
    pub amount1: I256,
    pub sqrt_price_x96: U256,
    pub liquidity: u128,
    pub tick: i32,
    pub protocol_fees_token0: u128,
    pub protocol_fees_token1: u128,
}

/// True when topic0 is the pool `Swap` signature.
pub fn is_swap_log(log: &LogRecord) -> bool {
    log.topics.first() == Some(&Swap::SIGNATURE_HASH)
}

/// Decodes a pool `Swap` log, `None` if the log is anything else or malformed.
pub fn decode_swap_log(log: &LogRecord) -> Option<SwapEvent> {
    if !is_swap_log(log) {
        return None;
    }

    let decoded = match Swap::decode_raw_log(log.topics.iter().copied(), &log.data, true) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::debug!(tx_hash = %log.tx_hash, error = %e, "undecodable swap log");
            return None;
        }
    };

    Some(SwapEvent {
        pool: log.address,
        sender: decoded.sender,
        recipient: decoded.recipient,
        amount0: decoded.amount0,
        amount1: decoded.amount1,
        sqrt_price_x96: U256::from(decoded.sqrtPriceX96),
        liquidity: decoded.liquidity,
        tick: i32::try_from(decoded.tick).ok()?,
        protocol_fees_token0: decoded.protocolFeesToken0,
        protocol_fees_token1: decoded.protocolFeesToken1,
    })
}

/// Router fee tier from its basis-point-hundredths form (500 = 0.05%).
pub fn fee_tier(fee: u32) -> U24 {
    U24::from(fee)
}
