// In-memory wallet + chain used by the integration tests.
// Decodes calldata with the desk's own ABI bindings and applies it to a
// tiny ledger of native balances, two ERC20s and the escrow.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolInterface};
use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};

use otc_desk::config::{ChainParams, Config};
use otc_desk::contracts::{IOtcEscrow, IERC20};
use otc_desk::error::{OtcError, OtcResult, UNRECOGNIZED_CHAIN_CODE};
use otc_desk::storage::MemoryRateStore;
use otc_desk::types::parse_amount;
use otc_desk::wallet::{LogEntry, TxReceipt, TxRequest, WalletEvent, WalletProvider};
use otc_desk::OtcDesk;

pub const GAS_PRICE_WEI: u64 = 5_000_000_000;

pub fn owner() -> Address {
    Config::default().receiver_address
}

pub fn buyer() -> Address {
    Address::repeat_byte(0xb0)
}

pub fn tokens(amount: &str) -> U256 {
    parse_amount(amount).unwrap()
}

#[derive(Debug, Clone)]
pub struct EscrowRecord {
    pub seller: Address,
    pub buyer: Address,
    pub amount: U256,
    pub released: bool,
    pub cancelled: bool,
}

pub struct FakeChain {
    pub chain_id: u64,
    pub known_chains: Vec<u64>,
    pub accounts: Vec<Address>,
    pub native: HashMap<Address, U256>,
    pub balances: HashMap<(Address, Address), U256>, // (token, holder)
    pub allowances: HashMap<(Address, Address, Address), U256>, // (token, owner, spender)
    pub trades: Vec<EscrowRecord>,
    pub fail_estimate: bool,
    pub reject_sends: bool,
    pub fail_trade_read_at: Option<u64>,
    pub fail_balance_reads: bool,
    pub trade_counter_override: Option<U256>,
    pub receipt_gate: Option<Arc<Notify>>,
    pub requests: Vec<String>,
    pub sent: Vec<TxRequest>,
    pub added_chains: Vec<ChainParams>,
    receipts: HashMap<B256, TxReceipt>,
    nonce: u64,
}

pub struct FakeWallet {
    pub token: Address,
    pub stable: Address,
    pub escrow: Address,
    chain: Mutex<FakeChain>,
    events: broadcast::Sender<WalletEvent>,
}

impl FakeWallet {
    pub fn new(account: Address, chain_id: u64) -> Self {
        let config = Config::default();
        let (events, _) = broadcast::channel(16);
        Self {
            token: config.token_address,
            stable: config.stable_address,
            escrow: config.escrow_address,
            chain: Mutex::new(FakeChain {
                chain_id,
                known_chains: vec![56, 97],
                accounts: vec![account],
                native: HashMap::new(),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                trades: Vec::new(),
                fail_estimate: false,
                reject_sends: false,
                fail_trade_read_at: None,
                fail_balance_reads: false,
                trade_counter_override: None,
                receipt_gate: None,
                requests: Vec::new(),
                sent: Vec::new(),
                added_chains: Vec::new(),
                receipts: HashMap::new(),
                nonce: 0,
            }),
            events,
        }
    }

    pub fn with_chain<R>(&self, f: impl FnOnce(&mut FakeChain) -> R) -> R {
        f(&mut self.chain.lock().unwrap())
    }

    pub fn fund_native(&self, holder: Address, amount: U256) {
        self.with_chain(|c| c.native.insert(holder, amount));
    }

    pub fn fund_token(&self, holder: Address, amount: U256) {
        let token = self.token;
        self.with_chain(|c| c.balances.insert((token, holder), amount));
    }

    pub fn fund_stable(&self, holder: Address, amount: U256) {
        let stable = self.stable;
        self.with_chain(|c| c.balances.insert((stable, holder), amount));
    }

    pub fn set_stable_allowance(&self, holder: Address, spender: Address, amount: U256) {
        let stable = self.stable;
        self.with_chain(|c| c.allowances.insert((stable, holder, spender), amount));
    }

    pub fn push_trade(&self, seller: Address, buyer: Address, amount: U256, released: bool, cancelled: bool) {
        self.with_chain(|c| {
            c.trades.push(EscrowRecord { seller, buyer, amount, released, cancelled })
        });
    }

    pub fn token_balance(&self, holder: Address) -> U256 {
        let token = self.token;
        self.with_chain(|c| c.balances.get(&(token, holder)).copied().unwrap_or_default())
    }

    pub fn native_balance(&self, holder: Address) -> U256 {
        self.with_chain(|c| c.native.get(&holder).copied().unwrap_or_default())
    }

    pub fn request_count(&self) -> usize {
        self.with_chain(|c| c.requests.len())
    }

    /// Requests that touch contracts or broadcast transactions.
    pub fn chain_calls(&self) -> usize {
        self.with_chain(|c| {
            c.requests
                .iter()
                .filter(|m| matches!(m.as_str(), "eth_call" | "eth_estimateGas" | "eth_sendTransaction"))
                .count()
        })
    }

    pub fn sent(&self) -> Vec<TxRequest> {
        self.with_chain(|c| c.sent.clone())
    }

    pub fn emit(&self, event: WalletEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, method: &str) {
        self.with_chain(|c| c.requests.push(method.to_string()));
    }

    fn read(&self, tx: &TxRequest) -> Result<Bytes, String> {
        let c = self.chain.lock().unwrap();
        if tx.to == self.token || tx.to == self.stable {
            let token = tx.to;
            let out = match IERC20::IERC20Calls::abi_decode(&tx.data, true).map_err(|e| e.to_string())? {
                IERC20::IERC20Calls::balanceOf(call) => {
                    if c.fail_balance_reads {
                        return Err("balance node unavailable".to_string());
                    }
                    let value = c.balances.get(&(token, call.account)).copied().unwrap_or_default();
                    IERC20::balanceOfCall::abi_encode_returns(&(value,))
                }
                IERC20::IERC20Calls::allowance(call) => {
                    let value = c
                        .allowances
                        .get(&(token, call.owner, call.spender))
                        .copied()
                        .unwrap_or_default();
                    IERC20::allowanceCall::abi_encode_returns(&(value,))
                }
                _ => return Ok(Bytes::new()),
            };
            return Ok(out.into());
        }

        if tx.to == self.escrow {
            let out = match IOtcEscrow::IOtcEscrowCalls::abi_decode(&tx.data, true).map_err(|e| e.to_string())? {
                IOtcEscrow::IOtcEscrowCalls::tjcdToken(_) => IOtcEscrow::tjcdTokenCall::abi_encode_returns(&(self.token,)),
                IOtcEscrow::IOtcEscrowCalls::tradeCounter(_) => {
                    let counter = c.trade_counter_override.unwrap_or(U256::from(c.trades.len()));
                    IOtcEscrow::tradeCounterCall::abi_encode_returns(&(counter,))
                }
                IOtcEscrow::IOtcEscrowCalls::trades(call) => {
                    let index = call.index.to::<u64>();
                    if c.fail_trade_read_at == Some(index) {
                        return Err("header not found".to_string());
                    }
                    let record = c.trades.get(index as usize).ok_or("index out of bounds")?;
                    IOtcEscrow::tradesCall::abi_encode_returns(&(
                        record.seller,
                        record.buyer,
                        record.amount,
                        call.index,
                        record.released,
                        record.cancelled,
                    ))
                }
                _ => return Ok(Bytes::new()),
            };
            return Ok(out.into());
        }

        Ok(Bytes::new())
    }

    /// Applies a transaction to `c`, or explains why it reverts.
    fn execute(&self, c: &mut FakeChain, tx: &TxRequest) -> Result<Vec<LogEntry>, String> {
        let from = tx.from.or_else(|| c.accounts.first().copied()).ok_or("no account")?;

        if tx.to == self.token || tx.to == self.stable {
            let token = tx.to;
            match IERC20::IERC20Calls::abi_decode(&tx.data, true).map_err(|e| e.to_string())? {
                IERC20::IERC20Calls::approve(call) => {
                    c.allowances.insert((token, from, call.spender), call.amount);
                }
                IERC20::IERC20Calls::transfer(call) => {
                    move_tokens(c, token, from, call.to, call.amount)?;
                }
                _ => return Err("not a write".to_string()),
            }
            return Ok(Vec::new());
        }

        if tx.to == self.escrow {
            match IOtcEscrow::IOtcEscrowCalls::abi_decode(&tx.data, true).map_err(|e| e.to_string())? {
                IOtcEscrow::IOtcEscrowCalls::createTrade(call) => {
                    let key = (self.token, from, self.escrow);
                    let allowance = c.allowances.get(&key).copied().unwrap_or_default();
                    if allowance < call.amount {
                        return Err("ERC20: insufficient allowance".to_string());
                    }
                    move_tokens(c, self.token, from, self.escrow, call.amount)?;
                    c.allowances.insert(key, allowance - call.amount);
                    let id = c.trades.len() as u64;
                    c.trades.push(EscrowRecord {
                        seller: from,
                        buyer: call.buyer,
                        amount: call.amount,
                        released: false,
                        cancelled: false,
                    });
                    return Ok(vec![LogEntry {
                        address: self.escrow,
                        topics: vec![
                            IOtcEscrow::TradeCreated::SIGNATURE_HASH,
                            B256::from(U256::from(id).to_be_bytes::<32>()),
                            B256::left_padding_from(from.as_slice()),
                            B256::left_padding_from(call.buyer.as_slice()),
                        ],
                        data: Bytes::from(call.amount.to_be_bytes::<32>().to_vec()),
                    }]);
                }
                IOtcEscrow::IOtcEscrowCalls::releaseTrade(call) => {
                    let record = open_trade(c, call.tradeId, from)?;
                    let (buyer, amount) = (record.buyer, record.amount);
                    record.released = true;
                    move_tokens(c, self.token, self.escrow, buyer, amount)?;
                }
                IOtcEscrow::IOtcEscrowCalls::cancelTrade(call) => {
                    let record = open_trade(c, call.tradeId, from)?;
                    let (seller, amount) = (record.seller, record.amount);
                    record.cancelled = true;
                    move_tokens(c, self.token, self.escrow, seller, amount)?;
                }
                IOtcEscrow::IOtcEscrowCalls::resolveDispute(call) => {
                    let record = c
                        .trades
                        .get_mut(call.tradeId.to::<usize>())
                        .ok_or("no such trade")?;
                    if record.released || record.cancelled {
                        return Err("trade not open".to_string());
                    }
                    record.released = true;
                    let amount = record.amount;
                    move_tokens(c, self.token, self.escrow, call.recipient, amount)?;
                }
                _ => return Err("not a write".to_string()),
            }
            return Ok(Vec::new());
        }

        // plain value transfer
        let balance = c.native.get(&from).copied().unwrap_or_default();
        if balance < tx.value {
            return Err("insufficient funds for transfer".to_string());
        }
        c.native.insert(from, balance - tx.value);
        *c.native.entry(tx.to).or_default() += tx.value;
        Ok(Vec::new())
    }

    fn is_write(&self, tx: &TxRequest) -> bool {
        if tx.to == self.escrow {
            return matches!(
                IOtcEscrow::IOtcEscrowCalls::abi_decode(&tx.data, true),
                Ok(IOtcEscrow::IOtcEscrowCalls::createTrade(_))
                    | Ok(IOtcEscrow::IOtcEscrowCalls::releaseTrade(_))
                    | Ok(IOtcEscrow::IOtcEscrowCalls::cancelTrade(_))
                    | Ok(IOtcEscrow::IOtcEscrowCalls::resolveDispute(_))
            );
        }
        if tx.to == self.token || tx.to == self.stable {
            return matches!(
                IERC20::IERC20Calls::abi_decode(&tx.data, true),
                Ok(IERC20::IERC20Calls::approve(_)) | Ok(IERC20::IERC20Calls::transfer(_))
            );
        }
        true
    }
}

fn move_tokens(c: &mut FakeChain, token: Address, from: Address, to: Address, amount: U256) -> Result<(), String> {
    let balance = c.balances.get(&(token, from)).copied().unwrap_or_default();
    if balance < amount {
        return Err("ERC20: transfer amount exceeds balance".to_string());
    }
    c.balances.insert((token, from), balance - amount);
    *c.balances.entry((token, to)).or_default() += amount;
    Ok(())
}

fn open_trade(c: &mut FakeChain, id: U256, from: Address) -> Result<&mut EscrowRecord, String> {
    let record = c.trades.get_mut(id.to::<usize>()).ok_or("no such trade")?;
    if record.released || record.cancelled {
        return Err("trade not open".to_string());
    }
    if record.seller != from {
        return Err("only seller".to_string());
    }
    Ok(record)
}

fn reverted(reason: String) -> OtcError {
    OtcError::TransactionReverted { tx_hash: None, reason }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn request_accounts(&self) -> OtcResult<Vec<Address>> {
        self.record("eth_requestAccounts");
        Ok(self.with_chain(|c| c.accounts.clone()))
    }

    async fn chain_id(&self) -> OtcResult<u64> {
        self.record("eth_chainId");
        Ok(self.with_chain(|c| c.chain_id))
    }

    async fn get_balance(&self, address: Address) -> OtcResult<U256> {
        self.record("eth_getBalance");
        Ok(self.native_balance(address))
    }

    async fn gas_price(&self) -> OtcResult<U256> {
        self.record("eth_gasPrice");
        Ok(U256::from(GAS_PRICE_WEI))
    }

    async fn call(&self, tx: &TxRequest) -> OtcResult<Bytes> {
        self.record("eth_call");
        if self.is_write(tx) {
            // dry run against a scratch copy of the state
            let mut c = self.chain.lock().unwrap();
            let snapshot = (c.native.clone(), c.balances.clone(), c.allowances.clone(), c.trades.clone());
            let outcome = self.execute(&mut c, tx);
            c.native = snapshot.0;
            c.balances = snapshot.1;
            c.allowances = snapshot.2;
            c.trades = snapshot.3;
            return outcome.map(|_| Bytes::new()).map_err(reverted);
        }
        self.read(tx).map_err(|message| OtcError::Rpc { code: -32000, message })
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> OtcResult<u64> {
        self.record("eth_estimateGas");
        if self.with_chain(|c| c.fail_estimate) {
            return Err(OtcError::Rpc {
                code: -32000,
                message: "gas required exceeds allowance".to_string(),
            });
        }
        let _ = tx;
        Ok(60_000)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> OtcResult<B256> {
        self.record("eth_sendTransaction");
        let mut c = self.chain.lock().unwrap();
        if c.reject_sends {
            return Err(OtcError::UserRejected);
        }
        c.sent.push(tx.clone());
        c.nonce += 1;
        let hash = B256::from(U256::from(c.nonce).to_be_bytes::<32>());

        let before = (c.native.clone(), c.balances.clone(), c.allowances.clone(), c.trades.clone());
        let (success, logs) = match self.execute(&mut c, tx) {
            Ok(logs) => (true, logs),
            Err(_) => {
                c.native = before.0;
                c.balances = before.1;
                c.allowances = before.2;
                c.trades = before.3;
                (false, Vec::new())
            }
        };
        let block_number = Some(c.nonce + 100);
        c.receipts.insert(
            hash,
            TxReceipt {
                transaction_hash: hash,
                success,
                block_number,
                gas_used: Some(50_000),
                logs,
            },
        );
        Ok(hash)
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> OtcResult<TxReceipt> {
        self.record("eth_getTransactionReceipt");
        // parked until the test lets the block through
        let gate = self.with_chain(|c| c.receipt_gate.clone());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.with_chain(|c| c.receipts.get(&tx_hash).cloned())
            .ok_or(OtcError::ConfirmationTimeout(tx_hash))
    }

    async fn switch_chain(&self, chain_id: u64) -> OtcResult<()> {
        self.record("wallet_switchEthereumChain");
        let known = self.with_chain(|c| c.known_chains.contains(&chain_id));
        if !known {
            return Err(OtcError::Rpc {
                code: UNRECOGNIZED_CHAIN_CODE,
                message: "Unrecognized chain ID".to_string(),
            });
        }
        self.with_chain(|c| c.chain_id = chain_id);
        self.emit(WalletEvent::ChainChanged(chain_id));
        Ok(())
    }

    async fn add_chain(&self, params: &ChainParams) -> OtcResult<()> {
        self.record("wallet_addEthereumChain");
        self.with_chain(|c| {
            c.known_chains.push(params.chain_id);
            c.added_chains.push(params.clone());
            c.chain_id = params.chain_id;
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

pub async fn desk_with(wallet: &Arc<FakeWallet>) -> Arc<OtcDesk> {
    desk_with_store(wallet, Arc::new(MemoryRateStore::new())).await
}

pub async fn desk_with_store(wallet: &Arc<FakeWallet>, store: Arc<MemoryRateStore>) -> Arc<OtcDesk> {
    let provider: Arc<dyn WalletProvider> = wallet.clone();
    OtcDesk::new(Config::default(), provider, store).await.unwrap()
}
