use crate::metrics;
pub use anyhow::Result;
use async_trait::async_trait;
use ethers::abi::{Function, Param, ParamType, StateMutability, Token};
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use log::debug;
use once_cell::sync::Lazy;
use std::sync::Arc;
use std::time::Duration;

/// A single contract read to be batched in a multicall.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Target contract address
    pub target: Address,
    /// Encoded function call data
    pub call_data: Bytes,
}

/// Executes batches of read-only calls pinned to a block height.
///
/// Results come back in the same order as `calls`; a call that reverted on-chain
/// yields `None` instead of failing the whole batch.
#[async_trait]
pub trait BatchCaller: Send + Sync {
    async fn call_batch(&self, calls: Vec<Call>, block: u64) -> Result<Vec<Option<Bytes>>>;
}

/// Multicall3 `aggregate3` batch executor.
///
/// Splits calls into chunks of `batch_size`, sleeps `batch_delay` between chunks
/// (not after the last one), and coalesces identical calls before sending so a
/// repeated `(target, call_data)` pair costs one slot.
///
/// ## Example
///
/// ```rust,no_run
/// # use balance_snapshot_sdk::multicall::{Call, Multicall, BatchCaller};
/// # use ethers::prelude::*;
/// # use std::sync::Arc;
/// # async fn run(provider: Arc<Provider<Http>>, multicall_address: Address, calls: Vec<Call>) -> anyhow::Result<()> {
/// let multicall = Multicall::new(provider, multicall_address, 500)
///     .with_batch_delay(std::time::Duration::from_millis(200));
/// let results = multicall.call_batch(calls, 19_000_000).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Multicall<M: Middleware> {
    pub provider: Arc<M>,
    multicall_address: Address,
    batch_size: usize,
    batch_delay: Duration,
}

impl<M: Middleware + 'static> Multicall<M> {
    pub fn new(provider: Arc<M>, multicall_address: Address, batch_size: usize) -> Self {
        Self {
            provider,
            multicall_address,
            batch_size: batch_size.max(1),
            batch_delay: Duration::ZERO,
        }
    }

    /// Pause between consecutive chunks, to stay under provider rate limits
    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }

    /// Runs a batch of calls at a specific block.
    pub async fn run(&self, calls: Vec<Call>, block: u64) -> Result<Vec<Option<Bytes>>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        // Coalesce identical calls to reduce load
        let (unique_calls, original_indices) = coalesce(&calls);
        debug!(
            "Multicall coalesced {} calls into {}",
            calls.len(),
            unique_calls.len()
        );

        let mut all_results_unique: Vec<Option<Bytes>> = Vec::with_capacity(unique_calls.len());
        let block_id = BlockId::Number(BlockNumber::Number(block.into()));
        let chunk_count = unique_calls.len().div_ceil(self.batch_size);

        for (i, call_chunk) in unique_calls.chunks(self.batch_size).enumerate() {
            metrics::record_multicall_batch_size(call_chunk.len());

            let return_data = self.execute_multicall3(call_chunk, block_id).await?;
            if return_data.len() != call_chunk.len() {
                anyhow::bail!(
                    "Multicall returned {} results for {} calls",
                    return_data.len(),
                    call_chunk.len()
                );
            }
            all_results_unique.extend(return_data);

            if i + 1 < chunk_count && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        // Reconstruct the full result set in the original order
        Ok(original_indices
            .into_iter()
            .map(|index| all_results_unique[index].clone())
            .collect())
    }

    async fn execute_multicall3(&self, calls: &[Call], block: BlockId) -> Result<Vec<Option<Bytes>>> {
        let typed_tx = self.aggregate3_tx(calls)?;
        let response = self.provider.call(&typed_tx, Some(block)).await?;

        decode_aggregate3_response(&response)
    }

    fn aggregate3_tx(&self, calls: &[Call]) -> Result<TypedTransaction> {
        // Call3 struct: (address target, bool allowFailure, bytes callData)
        let call_tokens = calls
            .iter()
            .map(|call| {
                Token::Tuple(vec![
                    Token::Address(call.target),
                    Token::Bool(true),
                    Token::Bytes(call.call_data.to_vec()),
                ])
            })
            .collect();

        let calldata = AGGREGATE3.encode_input(&[Token::Array(call_tokens)])?;

        let tx_request = TransactionRequest::new()
            .to(self.multicall_address)
            .data(calldata);
        Ok(tx_request.into())
    }
}

#[async_trait]
impl<M: Middleware + 'static> BatchCaller for Multicall<M> {
    async fn call_batch(&self, calls: Vec<Call>, block: u64) -> Result<Vec<Option<Bytes>>> {
        self.run(calls, block).await
    }
}

fn coalesce(calls: &[Call]) -> (Vec<Call>, Vec<usize>) {
    let mut unique_calls = indexmap::IndexSet::new();
    let original_indices = calls
        .iter()
        .map(|call| unique_calls.insert_full(call.clone()).0)
        .collect();
    (unique_calls.into_iter().collect(), original_indices)
}

static AGGREGATE3: Lazy<Function> = Lazy::new(aggregate3_function);

fn result_tuple() -> ParamType {
    // Result struct: (bool success, bytes returnData)
    ParamType::Array(Box::new(ParamType::Tuple(vec![ParamType::Bool, ParamType::Bytes])))
}

#[allow(deprecated)]
fn aggregate3_function() -> Function {
    Function {
        name: "aggregate3".to_string(),
        inputs: vec![Param {
            name: "calls".to_string(),
            kind: ParamType::Array(Box::new(ParamType::Tuple(vec![
                ParamType::Address,
                ParamType::Bool,
                ParamType::Bytes,
            ]))),
            internal_type: None,
        }],
        outputs: vec![Param {
            name: "returnData".to_string(),
            kind: result_tuple(),
            internal_type: None,
        }],
        constant: None,
        state_mutability: StateMutability::Payable,
    }
}

fn decode_aggregate3_response(response: &[u8]) -> Result<Vec<Option<Bytes>>> {
    let results_array = ethers::abi::decode(&[result_tuple()], response)?
        .into_iter()
        .next()
        .and_then(|t| t.into_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid multicall response format"))?;

    results_array
        .into_iter()
        .map(|token| match token {
            Token::Tuple(fields) => match fields.as_slice() {
                [Token::Bool(true), Token::Bytes(data)] => Ok(Some(Bytes::from(data.clone()))),
                [Token::Bool(false), _] => Ok(None),
                _ => Err(anyhow::anyhow!("Invalid multicall result tuple")),
            },
            _ => Err(anyhow::anyhow!("Invalid multicall result entry")),
        })
        .collect()
}
