// WebSocket JSON-RPC client for an EIP-1193 wallet endpoint.
// Requests are multiplexed by id over one socket; `eth_subscription`
// notifications for accountsChanged / chainChanged become WalletEvents.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{LogEntry, TxReceipt, TxRequest, WalletEvent, WalletProvider};
use crate::config::ChainParams;
use crate::error::{OtcError, OtcResult, USER_REJECTED_CODE};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<OtcResult<Value>>>>>;
type SubscriptionMap = Arc<Mutex<HashMap<String, Notification>>>;

#[derive(Debug, Clone, Copy)]
enum Notification {
    AccountsChanged,
    ChainChanged,
}

pub struct RpcWallet {
    outbound: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    subscriptions: SubscriptionMap,
    next_id: AtomicU64,
    events: broadcast::Sender<WalletEvent>,
    poll_interval: Duration,
    receipt_timeout: Duration,
}

impl RpcWallet {
    pub async fn connect(url: &str, poll_interval: Duration, receipt_timeout: Duration) -> OtcResult<Self> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| OtcError::WalletUnavailable(format!("{}: {}", url, e)))?;
        let (mut sink, mut source) = stream.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let subscriptions: SubscriptionMap = Arc::new(Mutex::new(HashMap::new()));
        let (events, _) = broadcast::channel(64);

        let writer_pending = pending.clone();
        let writer_closed = closed.clone();
        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    error!("Failed to write to wallet socket: {}", e);
                    break;
                }
            }
            fail_pending(&writer_pending, &writer_closed).await;
        });

        let reader_pending = pending.clone();
        let reader_closed = closed.clone();
        let reader_subscriptions = subscriptions.clone();
        let reader_events = events.clone();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        dispatch_frame(&text, &reader_pending, &reader_subscriptions, &reader_events).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Wallet socket error: {}", e);
                        break;
                    }
                }
            }

            warn!("Wallet connection closed");
            fail_pending(&reader_pending, &reader_closed).await;
            let _ = reader_events.send(WalletEvent::Disconnected);
        });

        let wallet = Self {
            outbound,
            pending,
            closed,
            subscriptions,
            next_id: AtomicU64::new(1),
            events,
            poll_interval,
            receipt_timeout,
        };
        wallet.subscribe_notifications().await;

        info!("Wallet endpoint connected: {}", url);
        Ok(wallet)
    }

    async fn request(&self, method: &str, params: Value) -> OtcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (responder, response) = oneshot::channel();
        {
            // the flag is only flipped under this lock, so a request inserted
            // here is always drained by fail_pending
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::Acquire) {
                return Err(OtcError::WalletUnavailable("wallet connection closed".to_string()));
            }
            pending.insert(id, responder);
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("wallet request {}: {}", id, payload);

        if self.outbound.send(Message::Text(payload.to_string())).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(OtcError::WalletUnavailable("wallet connection closed".to_string()));
        }

        response.await.map_err(|_| {
            OtcError::WalletUnavailable("wallet connection closed before responding".to_string())
        })?
    }

    async fn subscribe_notifications(&self) {
        for (name, kind) in [
            ("accountsChanged", Notification::AccountsChanged),
            ("chainChanged", Notification::ChainChanged),
        ] {
            match self.request("eth_subscribe", json!([name])).await {
                Ok(Value::String(subscription_id)) => {
                    self.subscriptions.lock().await.insert(subscription_id, kind);
                }
                Ok(other) => warn!("Unexpected eth_subscribe response for {}: {}", name, other),
                Err(e) => warn!("Wallet does not push {} notifications: {}", name, e),
            }
        }
    }
}

// Marks the connection closed and fails every request still waiting on it.
async fn fail_pending(pending: &PendingMap, closed: &AtomicBool) {
    let mut pending = pending.lock().await;
    closed.store(true, Ordering::Release);
    for (_, responder) in pending.drain() {
        let _ = responder.send(Err(OtcError::WalletUnavailable(
            "wallet connection closed".to_string(),
        )));
    }
}

async fn dispatch_frame(
    text: &str,
    pending: &PendingMap,
    subscriptions: &SubscriptionMap,
    events: &broadcast::Sender<WalletEvent>,
) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("Ignoring malformed wallet frame: {}", e);
            return;
        }
    };

    if let Some(id) = frame.get("id").and_then(Value::as_u64) {
        let outcome = match frame.get("error") {
            Some(err) if !err.is_null() => Err(map_rpc_error(err)),
            _ => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
        };
        if let Some(responder) = pending.lock().await.remove(&id) {
            let _ = responder.send(outcome);
        }
        return;
    }

    if frame.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        let params = &frame["params"];
        let Some(subscription_id) = params.get("subscription").and_then(Value::as_str) else {
            return;
        };
        let kind = subscriptions.lock().await.get(subscription_id).copied();
        let event = match kind {
            Some(Notification::AccountsChanged) => {
                let accounts = params["result"]
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .filter_map(|s| Address::from_str(s).ok())
                            .collect()
                    })
                    .unwrap_or_default();
                WalletEvent::AccountsChanged(accounts)
            }
            Some(Notification::ChainChanged) => match parse_u64(&params["result"]) {
                Ok(chain_id) => WalletEvent::ChainChanged(chain_id),
                Err(e) => {
                    warn!("Bad chainChanged payload: {}", e);
                    return;
                }
            },
            None => return,
        };
        debug!("wallet event: {:?}", event);
        let _ = events.send(event);
    }
}

fn map_rpc_error(err: &Value) -> OtcError {
    let code = err.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown wallet error")
        .to_string();

    if code == USER_REJECTED_CODE {
        return OtcError::UserRejected;
    }

    if code == 3 || message.contains("execution reverted") {
        let reason = err
            .get("data")
            .and_then(Value::as_str)
            .and_then(|data| Bytes::from_str(data).ok())
            .and_then(|data| alloy_sol_types::decode_revert_reason(&data))
            .unwrap_or(message);
        return OtcError::TransactionReverted { tx_hash: None, reason };
    }

    OtcError::Rpc { code, message }
}

fn parse_u256(value: &Value) -> OtcResult<U256> {
    let text = value
        .as_str()
        .ok_or_else(|| OtcError::Decode(format!("expected hex quantity, got {}", value)))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).map_err(|e| OtcError::Decode(format!("{}: {}", text, e)))
}

fn parse_u64(value: &Value) -> OtcResult<u64> {
    if let Some(number) = value.as_u64() {
        return Ok(number);
    }
    let wide = parse_u256(value)?;
    u64::try_from(wide).map_err(|_| OtcError::Decode(format!("quantity {} does not fit in u64", wide)))
}

fn quantity<T: std::fmt::LowerHex>(value: T) -> String {
    format!("0x{:x}", value)
}

fn tx_to_json(tx: &TxRequest) -> Value {
    let mut object = serde_json::Map::new();
    if let Some(from) = tx.from {
        object.insert("from".to_string(), json!(from.to_checksum(None)));
    }
    object.insert("to".to_string(), json!(tx.to.to_checksum(None)));
    if !tx.value.is_zero() {
        object.insert("value".to_string(), json!(quantity(tx.value)));
    }
    if !tx.data.is_empty() {
        object.insert("data".to_string(), json!(tx.data.to_string()));
    }
    if let Some(gas) = tx.gas {
        object.insert("gas".to_string(), json!(quantity(gas)));
    }
    if let Some(gas_price) = tx.gas_price {
        object.insert("gasPrice".to_string(), json!(quantity(gas_price)));
    }
    Value::Object(object)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    status: Option<U64>,
    block_number: Option<U64>,
    gas_used: Option<U64>,
    #[serde(default)]
    logs: Vec<RawLog>,
}

#[derive(Deserialize)]
struct RawLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
}

impl From<RawReceipt> for TxReceipt {
    fn from(raw: RawReceipt) -> Self {
        Self {
            transaction_hash: raw.transaction_hash,
            // pre-Byzantium receipts carry no status; treat as success
            success: raw.status.map(|s| s != U64::ZERO).unwrap_or(true),
            block_number: raw.block_number.map(|n| n.to::<u64>()),
            gas_used: raw.gas_used.map(|n| n.to::<u64>()),
            logs: raw
                .logs
                .into_iter()
                .map(|log| LogEntry {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request_accounts(&self) -> OtcResult<Vec<Address>> {
        let result = self.request("eth_requestAccounts", json!([])).await?;
        let accounts: Vec<String> = serde_json::from_value(result)?;
        accounts
            .iter()
            .map(|s| Address::from_str(s).map_err(|e| OtcError::Decode(format!("{}: {}", s, e))))
            .collect()
    }

    async fn chain_id(&self) -> OtcResult<u64> {
        let result = self.request("eth_chainId", json!([])).await?;
        parse_u64(&result)
    }

    async fn get_balance(&self, address: Address) -> OtcResult<U256> {
        let result = self
            .request("eth_getBalance", json!([address.to_checksum(None), "latest"]))
            .await?;
        parse_u256(&result)
    }

    async fn gas_price(&self) -> OtcResult<U256> {
        let result = self.request("eth_gasPrice", json!([])).await?;
        parse_u256(&result)
    }

    async fn call(&self, tx: &TxRequest) -> OtcResult<Bytes> {
        let result = self.request("eth_call", json!([tx_to_json(tx), "latest"])).await?;
        let data = result
            .as_str()
            .ok_or_else(|| OtcError::Decode(format!("eth_call returned {}", result)))?;
        Bytes::from_str(data).map_err(|e| OtcError::Decode(e.to_string()))
    }

    async fn estimate_gas(&self, tx: &TxRequest) -> OtcResult<u64> {
        let result = self.request("eth_estimateGas", json!([tx_to_json(tx)])).await?;
        parse_u64(&result)
    }

    async fn send_transaction(&self, tx: &TxRequest) -> OtcResult<B256> {
        let result = self.request("eth_sendTransaction", json!([tx_to_json(tx)])).await?;
        let hash = result
            .as_str()
            .ok_or_else(|| OtcError::Decode(format!("eth_sendTransaction returned {}", result)))?;
        B256::from_str(hash).map_err(|e| OtcError::Decode(e.to_string()))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> OtcResult<TxReceipt> {
        let poll = async {
            loop {
                let result = self
                    .request("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
                    .await?;
                if !result.is_null() {
                    let raw: RawReceipt = serde_json::from_value(result)?;
                    return Ok::<TxReceipt, OtcError>(raw.into());
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(self.receipt_timeout, poll)
            .await
            .map_err(|_| OtcError::ConfirmationTimeout(tx_hash))?
    }

    async fn switch_chain(&self, chain_id: u64) -> OtcResult<()> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": quantity(chain_id) }]),
        )
        .await?;
        Ok(())
    }

    async fn add_chain(&self, params: &ChainParams) -> OtcResult<()> {
        self.request(
            "wallet_addEthereumChain",
            json!([{
                "chainId": quantity(params.chain_id),
                "chainName": params.chain_name,
                "nativeCurrency": {
                    "name": params.currency_name,
                    "symbol": params.currency_symbol,
                    "decimals": params.currency_decimals,
                },
                "rpcUrls": params.rpc_urls,
                "blockExplorerUrls": params.explorer_urls,
            }]),
        )
        .await?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
