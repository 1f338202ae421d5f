//! Deriv WebSocket API message encoding and decoding
//!
//! Parsing is kept free of I/O so every frame shape can be unit tested.

use crate::types::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use uuid::Uuid;

/// Parse one text frame into a feed event.
///
/// Returns `Ok(None)` for frames the consumer has no use for
/// (subscription acks, `forget_all` replies, empty contract updates).
pub fn parse_message(text: &str) -> Result<Option<FeedEvent>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FeedError::Protocol(e.to_string()))?;

    let msg_type = value
        .get("msg_type")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();

        if msg_type == "buy" {
            return Ok(Some(FeedEvent::BuyRejected {
                decision_id: passthrough_decision_id(&value),
                message,
            }));
        }
        return Ok(Some(FeedEvent::ApiError {
            msg_type: msg_type.to_string(),
            message,
        }));
    }

    match msg_type {
        "authorize" => {
            let login_id = value
                .get("authorize")
                .and_then(|a| a.get("loginid"))
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(Some(FeedEvent::Authorized { login_id }))
        }
        "tick" => parse_tick(&value).map(|t| Some(FeedEvent::Tick(t))),
        "history" => parse_history(&value).map(|h| Some(FeedEvent::History(h))),
        "buy" => parse_buy(&value).map(Some),
        "proposal_open_contract" => {
            Ok(parse_open_contract(&value)?.map(FeedEvent::Settlement))
        }
        _ => Ok(None),
    }
}

fn parse_tick(value: &Value) -> Result<Tick> {
    let tick = value
        .get("tick")
        .ok_or_else(|| FeedError::Protocol("Missing tick body".to_string()))?;

    let symbol = tick
        .get("symbol")
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::Protocol("Missing tick symbol".to_string()))?;

    let quote = tick
        .get("quote")
        .ok_or_else(|| FeedError::Protocol("Missing tick quote".to_string()))
        .and_then(decimal_field)?;

    let sequence = tick
        .get("epoch")
        .and_then(Value::as_u64)
        .ok_or_else(|| FeedError::Protocol("Missing tick epoch".to_string()))?;

    let pip_size = tick
        .get("pip_size")
        .and_then(Value::as_u64)
        .map(|p| p as u32);

    Ok(Tick {
        symbol: symbol.to_string(),
        quote,
        sequence,
        pip_size,
    })
}

/// `ticks_history` reply: parallel `prices` and `times` arrays, symbol in `echo_req`
fn parse_history(value: &Value) -> Result<TickHistory> {
    let symbol = value
        .get("echo_req")
        .and_then(|e| e.get("ticks_history"))
        .and_then(Value::as_str)
        .ok_or_else(|| FeedError::Protocol("Missing ticks_history symbol".to_string()))?;

    let history = value
        .get("history")
        .ok_or_else(|| FeedError::Protocol("Missing history body".to_string()))?;

    let array = |field: &str| {
        history
            .get(field)
            .and_then(Value::as_array)
            .ok_or_else(|| FeedError::Protocol(format!("Missing history {}", field)))
    };
    let prices = array("prices")?;
    let times = array("times")?;
    if prices.len() != times.len() {
        return Err(FeedError::Protocol(format!(
            "History has {} prices but {} times",
            prices.len(),
            times.len()
        )));
    }

    let pip_size = value
        .get("pip_size")
        .and_then(Value::as_u64)
        .map(|p| p as u32);

    let ticks = prices
        .iter()
        .zip(times)
        .map(|(price, time)| {
            let sequence = time
                .as_u64()
                .ok_or_else(|| FeedError::Protocol(format!("Invalid history time {}", time)))?;
            Ok(Tick {
                symbol: symbol.to_string(),
                quote: decimal_field(price)?,
                sequence,
                pip_size,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TickHistory {
        symbol: symbol.to_string(),
        ticks,
    })
}

fn parse_buy(value: &Value) -> Result<FeedEvent> {
    let contract_id = value
        .get("buy")
        .and_then(|b| b.get("contract_id"))
        .and_then(id_field)
        .ok_or_else(|| FeedError::Protocol("Missing contract_id in buy".to_string()))?;

    let decision_id = passthrough_decision_id(value)
        .ok_or_else(|| FeedError::Protocol("Missing decision_id passthrough".to_string()))?;

    Ok(FeedEvent::BuyAccepted {
        decision_id,
        contract_id,
    })
}

fn parse_open_contract(value: &Value) -> Result<Option<Settlement>> {
    let contract = match value.get("proposal_open_contract") {
        Some(c) => c,
        None => return Ok(None),
    };

    // The venue sends an empty body when a finished subscription closes
    let contract_id = match contract.get("contract_id").and_then(id_field) {
        Some(id) => id,
        None => return Ok(None),
    };

    let is_sold = match contract.get("is_sold") {
        Some(Value::Bool(b)) => *b,
        Some(v) => v.as_u64() == Some(1),
        None => false,
    };

    let status = match contract.get("status").and_then(Value::as_str) {
        Some("won") => ContractStatus::Won,
        Some("lost") => ContractStatus::Lost,
        _ => ContractStatus::Open,
    };

    let profit = match contract.get("profit") {
        Some(v) if !v.is_null() => decimal_field(v)?,
        _ => Decimal::ZERO,
    };

    let symbol = contract
        .get("underlying")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Some(Settlement {
        contract_id,
        is_settled: is_sold && status != ContractStatus::Open,
        status,
        profit,
        symbol,
    }))
}

/// Decision id echoed in `passthrough` (top level or inside `echo_req`)
fn passthrough_decision_id(value: &Value) -> Option<Uuid> {
    value
        .get("passthrough")
        .or_else(|| value.get("echo_req").and_then(|e| e.get("passthrough")))
        .and_then(|p| p.get("decision_id"))
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

/// Numbers go through their shortest round-trip form, which reproduces the
/// venue's quote text for the precisions it sends
fn decimal_field(value: &Value) -> Result<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => {
            return Err(FeedError::Protocol(format!(
                "Expected numeric value, got {}",
                other
            )))
        }
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| FeedError::Protocol(format!("Invalid decimal {}: {}", text, e)))
}

fn id_field(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

pub fn authorize_request(token: &str) -> Value {
    json!({ "authorize": token })
}

pub fn subscribe_ticks_request(symbol: &str) -> Value {
    json!({ "ticks": symbol, "subscribe": 1 })
}

/// Last `count` ticks up to now
pub fn ticks_history_request(symbol: &str, count: usize) -> Value {
    json!({
        "ticks_history": symbol,
        "count": count,
        "end": "latest",
        "style": "ticks",
    })
}

pub fn forget_all_request(stream: &str) -> Value {
    json!({ "forget_all": stream })
}

/// Re-attach to settlement updates for a contract bought earlier
pub fn open_contract_request(contract_id: &str) -> Value {
    let id = contract_id
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(contract_id));
    json!({ "proposal_open_contract": 1, "contract_id": id, "subscribe": 1 })
}

/// Buy request with settlement updates subscribed
pub fn buy_request(request: &TradeRequest) -> Result<Value> {
    let stake = request
        .stake
        .to_f64()
        .ok_or_else(|| FeedError::Protocol(format!("Unrepresentable stake {}", request.stake)))?;

    let mut parameters = json!({
        "amount": stake,
        "basis": "stake",
        "contract_type": request.contract.as_str(),
        "currency": request.currency,
        "duration": request.duration_ticks,
        "duration_unit": "t",
        "symbol": request.symbol,
    });

    if let Some(barrier) = request.barrier {
        parameters["barrier"] = Value::from(barrier.to_string());
    } else if request.contract.needs_barrier() {
        return Err(FeedError::Protocol(format!(
            "{} requires a barrier",
            request.contract
        )));
    }

    Ok(json!({
        "buy": 1,
        "subscribe": 1,
        "price": stake,
        "parameters": parameters,
        "passthrough": { "decision_id": request.decision_id.to_string() },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tick() {
        let frame = r#"{"msg_type":"tick","tick":{"epoch":1700000001,"quote":1234.5,"symbol":"R_100","pip_size":2}}"#;
        let event = parse_message(frame).unwrap().unwrap();

        match event {
            FeedEvent::Tick(tick) => {
                assert_eq!(tick.symbol, "R_100");
                assert_eq!(tick.quote, Decimal::from_str("1234.5").unwrap());
                assert_eq!(tick.sequence, 1700000001);
                assert_eq!(tick.pip_size, Some(2));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_quotes_keep_sent_decimals() {
        let exact = |raw: &str| decimal_field(&serde_json::from_str::<Value>(raw).unwrap()).unwrap();

        assert_eq!(exact("9487.123"), Decimal::from_str("9487.123").unwrap());
        assert_eq!(exact("0.1"), Decimal::from_str("0.1").unwrap());
        assert_eq!(exact("\"1234.50\""), Decimal::from_str("1234.50").unwrap());

        // A numeric trailing zero is not sent back; pip_size restores it
        assert_eq!(exact("1234.50").to_string(), "1234.5");
        assert!(decimal_field(&Value::Bool(true)).is_err());
    }

    #[test]
    fn test_parse_history() {
        let frame = r#"{"msg_type":"history","echo_req":{"ticks_history":"R_50","count":3,"end":"latest","style":"ticks"},"history":{"prices":[251.1234,251.1301,251.12],"times":[1700000001,1700000002,1700000003]},"pip_size":4}"#;

        match parse_message(frame).unwrap().unwrap() {
            FeedEvent::History(history) => {
                assert_eq!(history.symbol, "R_50");
                assert_eq!(history.ticks.len(), 3);
                assert_eq!(history.ticks[0].quote, Decimal::from_str("251.1234").unwrap());
                assert_eq!(history.ticks[2].sequence, 1700000003);
                assert_eq!(history.ticks[2].pip_size, Some(4));
                assert!(history.ticks.iter().all(|t| t.symbol == "R_50"));
            }
            other => panic!("unexpected event {:?}", other),
        }

        let uneven = r#"{"msg_type":"history","echo_req":{"ticks_history":"R_50"},"history":{"prices":[1.5],"times":[]}}"#;
        assert!(parse_message(uneven).is_err());

        let request = ticks_history_request("R_50", 100);
        assert_eq!(request["ticks_history"], "R_50");
        assert_eq!(request["count"], 100);
        assert_eq!(request["end"], "latest");
    }

    #[test]
    fn test_parse_buy_ack_and_rejection() {
        let id = Uuid::new_v4();
        let ack = format!(
            r#"{{"msg_type":"buy","buy":{{"contract_id":987654,"buy_price":1}},"passthrough":{{"decision_id":"{}"}}}}"#,
            id
        );
        assert_eq!(
            parse_message(&ack).unwrap(),
            Some(FeedEvent::BuyAccepted {
                decision_id: id,
                contract_id: "987654".to_string(),
            })
        );

        let rejected = format!(
            r#"{{"msg_type":"buy","error":{{"code":"InsufficientBalance","message":"Insufficient balance"}},"echo_req":{{"passthrough":{{"decision_id":"{}"}}}}}}"#,
            id
        );
        assert_eq!(
            parse_message(&rejected).unwrap(),
            Some(FeedEvent::BuyRejected {
                decision_id: Some(id),
                message: "Insufficient balance".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_open_contract() {
        let sold = r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{"contract_id":42,"is_sold":1,"status":"lost","profit":-0.35,"underlying":"1HZ10V"}}"#;
        let event = parse_message(sold).unwrap().unwrap();
        assert_eq!(
            event,
            FeedEvent::Settlement(Settlement {
                contract_id: "42".to_string(),
                is_settled: true,
                status: ContractStatus::Lost,
                profit: Decimal::from_str("-0.35").unwrap(),
                symbol: Some("1HZ10V".to_string()),
            })
        );

        let open = r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{"contract_id":42,"is_sold":0,"status":"open","profit":0.1}}"#;
        match parse_message(open).unwrap() {
            Some(FeedEvent::Settlement(s)) => assert!(!s.is_settled),
            other => panic!("unexpected event {:?}", other),
        }

        let empty = r#"{"msg_type":"proposal_open_contract","proposal_open_contract":{}}"#;
        assert_eq!(parse_message(empty).unwrap(), None);
    }

    #[test]
    fn test_parse_errors_and_unknown_frames() {
        let err = r#"{"msg_type":"authorize","error":{"message":"The token is invalid."}}"#;
        assert_eq!(
            parse_message(err).unwrap(),
            Some(FeedEvent::ApiError {
                msg_type: "authorize".to_string(),
                message: "The token is invalid.".to_string(),
            })
        );

        assert_eq!(parse_message(r#"{"msg_type":"forget_all","forget_all":[]}"#).unwrap(), None);
        assert!(parse_message("not json").is_err());
        assert!(parse_message(r#"{"msg_type":"tick","tick":{"symbol":"R_10"}}"#).is_err());
    }

    #[test]
    fn test_buy_request_encoding() {
        let request = TradeRequest {
            decision_id: Uuid::new_v4(),
            symbol: "R_10".to_string(),
            contract: ContractKind::DigitMatch,
            barrier: Some(7),
            stake: Decimal::from_str("1.06").unwrap(),
            duration_ticks: 1,
            currency: "USD".to_string(),
        };

        let msg = buy_request(&request).unwrap();
        assert_eq!(msg["buy"], 1);
        assert_eq!(msg["parameters"]["contract_type"], "DIGITMATCH");
        assert_eq!(msg["parameters"]["barrier"], "7");
        assert_eq!(msg["parameters"]["duration_unit"], "t");
        assert_eq!(msg["passthrough"]["decision_id"], request.decision_id.to_string());

        let missing_barrier = TradeRequest {
            barrier: None,
            ..request
        };
        assert!(buy_request(&missing_barrier).is_err());
    }

    #[test]
    fn test_open_contract_request_keeps_numeric_ids() {
        let msg = open_contract_request("12345");
        assert_eq!(msg["contract_id"], 12345);
        assert_eq!(msg["subscribe"], 1);
    }
}
