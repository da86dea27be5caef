//! Per-command argument schemas (§4.7: "a declared argument schema").

use serde::Deserialize;

fn parse<T: for<'de> Deserialize<'de>>(command: &str, args: &serde_json::Value) -> crate::error::Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| crate::error::Error::InvalidArgs {
        command: command.to_string(),
        reason: e.to_string(),
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateChannelArgs {
    pub room: String,
    pub channel: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteChannelArgs {
    pub room: String,
    pub channel: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinChannelArgs {
    pub room: String,
    pub channel: String,
}

pub type LeaveChannelArgs = JoinChannelArgs;

#[derive(Debug, Deserialize)]
pub struct ListChannelsArgs {
    pub room: String,
}

#[derive(Debug, Deserialize)]
pub struct ChannelInfoArgs {
    pub room: String,
    pub channel: String,
}

/// `room`/`channel` are optional only for admin principals, who may omit
/// both for a global read across the tenant (§4.6 "global history access
/// is admin-only"); handlers enforce that a non-admin always supplies both.
#[derive(Debug, Deserialize)]
pub struct HistoryGetArgs {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub since: Option<u64>,
    #[serde(default)]
    pub until: Option<u64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryReplayArgs {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    pub from_ts: u64,
    pub to_ts: u64,
    #[serde(default)]
    pub strict_sequence: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub fn parse_args<T: for<'de> Deserialize<'de>>(command: &str, args: &serde_json::Value) -> crate::error::Result<T> {
    parse(command, args)
}
