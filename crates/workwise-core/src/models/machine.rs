use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Operational,
    Maintenance,
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineStatus::Operational => write!(f, "Operational"),
            MachineStatus::Maintenance => write!(f, "Maintenance"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Machine {
    pub id: i64,
    pub name: String,
    pub model_number: String,
    pub location: String,
    pub status: MachineStatus,
    #[serde(default)]
    pub last_maintenance_date: Option<NaiveDate>,
}

impl Machine {
    pub fn is_operational(&self) -> bool {
        self.status == MachineStatus::Operational
    }
}

/// Body for creating or replacing a machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MachineInput {
    pub name: String,
    pub model_number: String,
    pub location: String,
    pub status: MachineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_maintenance_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaintenanceTicket {
    pub id: i64,
    /// Id of the machine the ticket was raised against
    pub machine: i64,
    pub issue_description: String,
    #[serde(default)]
    pub reported_by: Option<i64>,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
