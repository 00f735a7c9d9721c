use ethers::types::Address;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Zero address supplied where a token or pool address was required")]
    ZeroAddress,

    #[error("Invalid tick range [{lower}, {upper}) for spacing {spacing}")]
    InvalidTickRange { lower: i32, upper: i32, spacing: i32 },

    #[error("Pool {0:?} is not allowlisted")]
    PoolNotAllowlisted(Address),

    #[error("Pool {pool:?} does not hold the supplied token pair ({token_a:?}, {token_b:?})")]
    TokenMismatch {
        pool: Address,
        token_a: Address,
        token_b: Address,
    },

    #[error("Pool {0:?} holds neither the quote currency nor an approved connector")]
    UnsupportedPool(Address),

    #[error("No cached or discoverable route from {token_in:?} to {token_out:?}")]
    RouteNotFound {
        token_in: Address,
        token_out: Address,
    },

    #[error("Connector {0:?} has no anchor edge to the quote currency")]
    MissingAnchor(Address),

    #[error("Oracle observation failed for pool {pool:?}: {reason}")]
    Observation { pool: Address, reason: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("Contract error: {0}")]
    Contract(
        #[from]
        ethers::contract::ContractError<ethers::providers::Provider<ethers::providers::Http>>,
    ),

    #[error("Math error: {0}")]
    Math(#[from] uniswap_v3_math::error::UniswapV3MathError),

    #[error("Other: {0}")]
    Other(String),
}
