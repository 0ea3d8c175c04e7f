use crate::types::RoomId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub location: String,
    pub capacity: u32,
    /// Free-text equipment labels. Stored as a set, so repeated labels collapse.
    #[serde(default)]
    pub equipment: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomCreate {
    pub name: String,
    pub location: String,
    pub capacity: u32,
    #[serde(default)]
    pub equipment: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<BTreeSet<String>>,
}

impl Room {
    pub fn apply(&mut self, update: RoomUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(location) = update.location {
            self.location = location;
        }
        if let Some(capacity) = update.capacity {
            self.capacity = capacity;
        }
        if let Some(equipment) = update.equipment {
            self.equipment = equipment;
        }
    }
}
