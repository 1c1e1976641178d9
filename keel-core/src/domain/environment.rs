//! Target environment shared by deployments, infrastructure and configurations

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

wire_names!(Environment, "environment" {
    Dev => "DEV",
    Staging => "STAGING",
    Prod => "PROD",
});
