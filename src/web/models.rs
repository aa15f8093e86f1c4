use serde::{Deserialize, Serialize};

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "errorMessage")]
    pub error_message: String,
}

/// Body of `POST /transactions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddTxBody {
    pub to: String,
    pub amount: i64,
}

/// Body of `POST /peers`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddPeerBody {
    pub address: String,
    pub port: u16,
}

/// Response of `GET /wallet`.
#[derive(Debug, Serialize)]
pub struct WalletResponse {
    pub address: String,
}

/// Response of `GET /balance/{address}?total=true`.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: i64,
}

/// Query string of `GET /balance/{address}`.
#[derive(Debug, Default, Deserialize)]
pub struct BalanceQuery {
    #[serde(default)]
    pub total: bool,
}

/// Query string of the `/ws` upgrade.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(rename = "openPort")]
    pub open_port: u16,
}

/// One entry of the `GET /` documentation index.
#[derive(Debug, Serialize)]
pub struct UrlDescription {
    pub url: String,
    pub method: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl UrlDescription {
    pub fn new(url: &str, method: &str, description: &str, payload: Option<&str>) -> Self {
        UrlDescription {
            url: url.to_string(),
            method: method.to_string(),
            description: description.to_string(),
            payload: payload.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_field_name() {
        let body = ErrorResponse {
            error_message: "not enough funds".to_string(),
        };
        let json = serde_json::to_value(&body).expect("to_value failed");
        assert_eq!(json["errorMessage"], "not enough funds");
    }

    #[test]
    fn test_tx_body_field_names() {
        let body: AddTxBody =
            serde_json::from_str(r#"{"To": "addr", "Amount": 30}"#).expect("parse failed");
        assert_eq!(body.to, "addr");
        assert_eq!(body.amount, 30);
    }

    #[test]
    fn test_peer_body_field_names() {
        let body: AddPeerBody =
            serde_json::from_str(r#"{"Address": "127.0.0.1", "Port": 4000}"#).expect("parse failed");
        assert_eq!(body.address, "127.0.0.1");
        assert_eq!(body.port, 4000);
    }

    #[test]
    fn test_balance_query_defaults_to_utxo_list() {
        let query: BalanceQuery = serde_json::from_str("{}").expect("parse failed");
        assert!(!query.total);
    }
}
