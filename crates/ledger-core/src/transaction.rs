use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Keys every transaction must carry; metadata may not reuse them.
pub const REQUIRED_FIELDS: [&str; 3] = ["sender", "recipient", "amount"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transaction must be a JSON object")]
    NotAnObject,
    #[error("transaction missing required field: {0}")]
    MissingField(&'static str),
    #[error("transaction field `{field}` must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("transaction amount must be a number")]
    NonNumericAmount,
    #[error("transaction amount must be a positive number")]
    NonPositiveAmount,
}

/// A ledger payload: three typed fields plus free-form metadata.
///
/// `amount` is kept as a JSON number so `10` and `10.0` stay distinct; the
/// block hash covers the exact representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: Number,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: impl Into<Number>) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount: amount.into(),
            metadata: Map::new(),
        }
    }

    /// Build from a float amount. Non-finite values have no JSON form.
    pub fn with_f64_amount(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
    ) -> Result<Self, ValidationError> {
        let amount = Number::from_f64(amount).ok_or(ValidationError::NonNumericAmount)?;
        let tx = Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            metadata: Map::new(),
        };
        tx.validate()?;
        Ok(tx)
    }

    /// Attach one metadata entry. Reserved keys are ignored.
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !REQUIRED_FIELDS.contains(&key.as_str()) {
            self.metadata.insert(key, value);
        }
        self
    }

    /// Structural check of a raw record, as submitted by a front end.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let Value::Object(mut map) = value else {
            return Err(ValidationError::NotAnObject);
        };
        let sender = take_string(&mut map, "sender")?;
        let recipient = take_string(&mut map, "recipient")?;
        let amount = match map.remove("amount") {
            None => return Err(ValidationError::MissingField("amount")),
            Some(Value::Number(n)) => n,
            Some(_) => return Err(ValidationError::NonNumericAmount),
        };
        let tx = Self {
            sender,
            recipient,
            amount,
            metadata: map,
        };
        tx.validate()?;
        Ok(tx)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.amount.as_f64() {
            Some(a) if a > 0.0 => Ok(()),
            _ => Err(ValidationError::NonPositiveAmount),
        }
    }
}

fn take_string(map: &mut Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    match map.remove(field) {
        None => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ValidationError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}
