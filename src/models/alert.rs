use std::{fmt, str::FromStr};

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Above,
    Below,
}

impl Condition {
    /// Both directions are inclusive at the threshold.
    pub fn is_met(self, price: f64, threshold: f64) -> bool {
        match self {
            Condition::Above => price >= threshold,
            Condition::Below => price <= threshold,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Condition::Above => "above",
            Condition::Below => "below",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "above" => Ok(Condition::Above),
            "below" => Ok(Condition::Below),
            other => Err(format!("unknown condition: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    // None only for corrupted records; such alerts never trigger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<ObjectId>,

    pub coin_id: String,
    pub threshold: f64,
    pub condition: Condition,

    #[serde(default)]
    pub triggered: bool,
    #[serde(default)]
    pub triggered_at: Option<i64>,

    // unix millis
    pub created_at: i64,
}

impl Alert {
    pub fn new(owner_id: ObjectId, coin_id: &str, threshold: f64, condition: Condition, created_at: i64) -> Self {
        Self {
            id: ObjectId::new(),
            owner_id: Some(owner_id),
            coin_id: coin_id.to_string(),
            threshold,
            condition,
            triggered: false,
            triggered_at: None,
            created_at,
        }
    }

    /// Untriggered and owned: the only alerts the ingestion loop looks at.
    pub fn is_armed(&self) -> bool {
        !self.triggered && self.owner_id.is_some()
    }

    pub fn is_hit(&self, price: f64) -> bool {
        self.condition.is_met(price, self.threshold)
    }
}
