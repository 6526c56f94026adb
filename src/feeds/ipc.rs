//! Inbound JSON-lines channel: price ticks, fill confirmations, rejects and
//! caller commands, one `{"type": ..., "payload": {...}}` object per line.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UnixListener;
use uuid::Uuid;

use crate::core::{
    AccountId, Error, FillConfirmation, InboundEvent, OrderId, OrderRequest, PositionId, PriceTick, RejectNotice,
    Result, Symbol,
};

/// A decoded inbound line
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Collaborator event (tick, fill, reject)
    Event(InboundEvent),
    Place(OrderRequest),
    Cancel { account: AccountId, order_id: OrderId },
    Close { account: AccountId, position_id: PositionId, amount: Option<Decimal> },
}

#[derive(Debug, Deserialize)]
struct IpcMessage {
    #[serde(rename = "type")]
    msg_type: String,
    payload: serde_json::Value,
}

/// Raw tick; decimals travel as strings
#[derive(Debug, Deserialize)]
struct IpcTick {
    symbol: String,
    price: String,
    ts: u64,
}

#[derive(Debug, Deserialize)]
struct IpcFill {
    order_id: String,
    filled: String,
    price: String,
}

#[derive(Debug, Deserialize)]
struct IpcReject {
    order_id: String,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct IpcPlace {
    account: String,
    symbol: String,
    kind: crate::core::OrderKind,
    side: crate::core::Side,
    price: Option<String>,
    amount: String,
    leverage: u32,
    #[serde(default)]
    margin_mode: crate::core::MarginMode,
}

#[derive(Debug, Deserialize)]
struct IpcCancel {
    account: String,
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct IpcClose {
    account: String,
    position_id: String,
    amount: Option<String>,
}

fn decimal(field: &str, raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| Error::Decode(format!("{}: {:?} is not a decimal ({})", field, raw, e)))
}

fn uuid(field: &str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::Decode(format!("{}: {:?} is not a uuid ({})", field, raw, e)))
}

/// Decode one line.
pub fn decode(line: &str) -> Result<Inbound> {
    let msg: IpcMessage = serde_json::from_str(line)?;

    let inbound = match msg.msg_type.as_str() {
        "tick" => {
            let raw: IpcTick = serde_json::from_value(msg.payload)?;
            Inbound::Event(InboundEvent::Tick(PriceTick {
                symbol: Symbol::new(&raw.symbol),
                price: decimal("price", &raw.price)?,
                timestamp: raw.ts,
            }))
        }
        "fill" => {
            let raw: IpcFill = serde_json::from_value(msg.payload)?;
            Inbound::Event(InboundEvent::Fill(FillConfirmation {
                order_id: uuid("order_id", &raw.order_id)?,
                filled_delta: decimal("filled", &raw.filled)?,
                fill_price: decimal("price", &raw.price)?,
            }))
        }
        "reject" => {
            let raw: IpcReject = serde_json::from_value(msg.payload)?;
            Inbound::Event(InboundEvent::Reject(RejectNotice {
                order_id: uuid("order_id", &raw.order_id)?,
                reason: raw.reason,
            }))
        }
        "place" => {
            let raw: IpcPlace = serde_json::from_value(msg.payload)?;
            Inbound::Place(OrderRequest {
                account: AccountId::new(raw.account),
                symbol: Symbol::new(raw.symbol),
                kind: raw.kind,
                side: raw.side,
                price: raw.price.as_deref().map(|p| decimal("price", p)).transpose()?,
                amount: decimal("amount", &raw.amount)?,
                leverage: raw.leverage,
                margin_mode: raw.margin_mode,
            })
        }
        "cancel" => {
            let raw: IpcCancel = serde_json::from_value(msg.payload)?;
            Inbound::Cancel {
                account: AccountId::new(raw.account),
                order_id: uuid("order_id", &raw.order_id)?,
            }
        }
        "close" => {
            let raw: IpcClose = serde_json::from_value(msg.payload)?;
            Inbound::Close {
                account: AccountId::new(raw.account),
                position_id: uuid("position_id", &raw.position_id)?,
                amount: raw.amount.as_deref().map(|a| decimal("amount", a)).transpose()?,
            }
        }
        other => return Err(Error::Decode(format!("unknown message type {:?}", other))),
    };

    Ok(inbound)
}

/// Listen on a Unix socket and forward decoded lines.
pub async fn listen(socket_path: String, tx: flume::Sender<Inbound>) -> Result<()> {
    let _ = std::fs::remove_file(&socket_path);
    let listener = UnixListener::bind(&socket_path)?;
    tracing::info!("IPC listener: {}", socket_path);
    loop {
        let (stream, _) = listener.accept().await?;
        let tx = tx.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stream);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match decode(&line) {
                    Ok(inbound) => {
                        if tx.send_async(inbound).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!("Dropping inbound line: {}", e),
                }
            }
        });
    }
}
